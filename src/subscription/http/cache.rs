use std::any::Any;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

use super::key::QueryKey;
use super::query::{QueryError, QueryResult, QueryState};

/// The fetch future shared by every caller that coalesces onto it.
pub(crate) type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, QueryError>>>;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// A cached entry with timestamp, staleness and fetch-generation information.
///
/// `data` survives failed and pending refetches as last-known-good; it is only
/// reported as current while `status` is [`QueryStatus::Success`].
pub struct CacheEntry<V> {
    pub status: QueryStatus,
    pub data: Option<V>,
    pub error: Option<QueryError>,
    pub last_fetched_at: Option<Instant>,
    pub is_stale: bool,
    generation: u64,
    in_flight: Option<(u64, SharedFetch<V>)>,
    /// Set when the entry is invalidated while the current generation is in
    /// flight; its result is stored but stays stale.
    invalidated_in_flight: bool,
}

impl<V: Clone> CacheEntry<V> {
    /// Creates an idle entry with no data.
    pub const fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            is_stale: false,
            generation: 0,
            in_flight: None,
            invalidated_in_flight: false,
        }
    }

    /// Generation of the most recently issued fetch.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks if this entry is stale based on the given stale time.
    ///
    /// An entry that has never completed a fetch is always stale.
    pub fn check_staleness(&mut self, stale_time: Duration) -> bool {
        match self.last_fetched_at {
            Some(at) if at.elapsed() >= stale_time => self.is_stale = true,
            None => self.is_stale = true,
            Some(_) => {}
        }
        self.is_stale
    }

    /// Returns `true` if cached data can be served without fetching.
    pub fn is_fresh(&mut self, stale_time: Duration) -> bool {
        self.status == QueryStatus::Success && !self.check_staleness(stale_time)
    }

    /// Marks this entry as stale and detaches any in-flight fetch so the next
    /// subscriber starts a new generation.
    ///
    /// A detached fetch that lands before that generation is issued still
    /// fills the entry, but the entry remains stale.
    pub fn mark_stale(&mut self) {
        self.is_stale = true;
        if self.in_flight.take().is_some() {
            self.invalidated_in_flight = true;
        }
    }

    /// The fetch currently in flight, if any.
    pub fn in_flight(&self) -> Option<(u64, SharedFetch<V>)> {
        self.in_flight.clone()
    }

    /// Registers a new fetch and returns its generation.
    pub fn begin(&mut self, fetch: SharedFetch<V>) -> u64 {
        self.generation += 1;
        self.status = QueryStatus::Pending;
        self.in_flight = Some((self.generation, fetch));
        self.invalidated_in_flight = false;
        self.generation
    }

    /// Applies the outcome of the fetch issued as `generation`.
    ///
    /// Returns `false` and leaves the entry untouched when a newer fetch has
    /// been issued since.
    pub fn settle(&mut self, generation: u64, outcome: Result<V, QueryError>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.in_flight = None;
        match outcome {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.status = QueryStatus::Success;
                self.last_fetched_at = Some(Instant::now());
                self.is_stale = self.invalidated_in_flight;
            }
            Err(error) => {
                self.error = Some(error);
                self.status = QueryStatus::Error;
            }
        }
        true
    }

    /// Updates the entry with new data, resetting timestamp and staleness.
    ///
    /// Supersedes any fetch in flight.
    pub fn update(&mut self, data: V) {
        self.generation += 1;
        self.in_flight = None;
        self.invalidated_in_flight = false;
        self.data = Some(data);
        self.error = None;
        self.status = QueryStatus::Success;
        self.last_fetched_at = Some(Instant::now());
        self.is_stale = false;
    }

    /// Checks if this entry should be garbage collected based on cache time.
    pub fn should_gc(&self, cache_time: Duration) -> bool {
        self.in_flight.is_none()
            && self
                .last_fetched_at
                .is_none_or(|at| at.elapsed() > cache_time)
    }

    /// Builds the externally visible result for this entry.
    pub fn snapshot(&self, key: &QueryKey) -> QueryResult<V> {
        let state = match self.status {
            QueryStatus::Idle => QueryState::Idle,
            QueryStatus::Pending => QueryState::Loading {
                previous: self.data.clone(),
            },
            QueryStatus::Success => match &self.data {
                Some(data) => QueryState::Success {
                    data: data.clone(),
                    is_stale: self.is_stale,
                },
                None => QueryState::Idle,
            },
            QueryStatus::Error => QueryState::Error {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| QueryError::Fetch("unknown error".to_owned())),
                previous: self.data.clone(),
            },
        };
        QueryResult {
            key: key.clone(),
            state,
        }
    }
}

impl<V: Clone> Default for CacheEntry<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a [`CacheEntry`] used by key-based operations that do not
/// know the value type, such as prefix invalidation and garbage collection.
pub(crate) trait ErasedEntry: Send + Sync {
    fn mark_stale(&mut self);
    fn should_gc(&self, cache_time: Duration) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<V> ErasedEntry for CacheEntry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn mark_stale(&mut self) {
        Self::mark_stale(self);
    }

    fn should_gc(&self, cache_time: Duration) -> bool {
        Self::should_gc(self, cache_time)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
