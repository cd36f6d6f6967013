//! HTTP query operations with caching and automatic refetching.
//!
//! This module provides the [`Query`] subscription and [`QueryClient`] for managing
//! reads with built-in caching, similar to SWR or TanStack Query.
//!
//! # Design Pattern: Subscription-based State Management
//!
//! Queries are **subscriptions** that continuously monitor and manage cached data.
//! When you subscribe to a query:
//!
//! 1. If fresh cached data exists, it's immediately emitted without a fetch
//! 2. If data is stale or missing, a fetch is triggered; stale data is kept as
//!    last-known-good while the fetch runs
//! 3. When a matching key prefix is invalidated, the query refetches
//!
//! Concurrent fetches of one key share a single in-flight request, and every
//! fetch is stamped with a per-key generation so that a slow, superseded
//! response can never overwrite a newer one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recall::query_key;
//! use recall::subscription::Subscription;
//! use recall::subscription::http::{Query, QueryClient, QueryError, QueryResult};
//!
//! enum Message {
//!     Tags(QueryResult<Vec<String>>),
//! }
//!
//! let client = Arc::new(QueryClient::new());
//! let tags = Subscription::new(Query::new(
//!     query_key!["/api/tags"],
//!     || Box::pin(async { Ok::<_, QueryError>(vec!["math".to_owned()]) }),
//!     client.clone(),
//! ))
//! .map(Message::Tags);
//!
//! // After creating a tag:
//! client.invalidate(&query_key!["/api/tags"]);
//! ```

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::cache::{CacheEntry, ErasedEntry};
use super::config::{QueryConfig, QueryOptions};
use super::fetch::HttpError;
use super::key::QueryKey;

/// Error type for query operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The key is already cached with a different value type.
    #[error("Cached value for {0} has a different type")]
    TypeMismatch(String),
}

/// The state of a query result.
///
/// Data from an earlier fetch that is not current is only ever exposed through
/// `previous`, never as `data`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Query is disabled or has not started.
    Idle,
    /// Query is loading (fetching data).
    Loading {
        /// Last-known-good data from an earlier fetch.
        previous: Option<T>,
    },
    /// Query succeeded with data.
    Success {
        /// The data returned by the query.
        data: T,
        /// Whether the data is stale and should be refetched.
        is_stale: bool,
    },
    /// Query failed with an error.
    Error {
        error: QueryError,
        /// Last-known-good data from an earlier fetch.
        previous: Option<T>,
    },
}

/// A query result containing the key and its current state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub key: QueryKey,
    /// The current state of the query.
    pub state: QueryState<T>,
}

impl<T> QueryResult<T> {
    #[must_use]
    pub const fn new(key: QueryKey, state: QueryState<T>) -> Self {
        Self { key, state }
    }

    /// Returns the data if the query succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns current data, or the last-known-good data while loading or failed.
    pub const fn last_known_data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success { data, .. } => Some(data),
            QueryState::Loading { previous } | QueryState::Error { previous, .. } => {
                previous.as_ref()
            }
            QueryState::Idle => None,
        }
    }

    /// Returns the error if the query failed.
    pub const fn error(&self) -> Option<&QueryError> {
        match &self.state {
            QueryState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if the query is disabled or not started.
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, QueryState::Idle)
    }

    /// Returns `true` if the query is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, QueryState::Loading { .. })
    }

    /// Returns `true` if the query succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, QueryState::Success { .. })
    }

    /// Returns `true` if the query failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, QueryState::Error { .. })
    }

    /// Returns `true` if the query data is stale.
    pub const fn is_stale(&self) -> bool {
        matches!(self.state, QueryState::Success { is_stale: true, .. })
    }
}

/// A client for managing query cache and invalidation.
///
/// The `QueryClient` is the central state manager for queries. It handles:
/// - Caching query results per [`QueryKey`]
/// - Coalescing concurrent fetches of the same key
/// - Discarding out-of-order results by fetch generation
/// - Broadcasting invalidation notifications
///
/// Each entry is only touched under its map shard guard and no guard is held
/// across an await point.
///
/// # Example
///
/// ```rust
/// use recall::subscription::http::{QueryClient, QueryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = QueryConfig::new(
///     Duration::from_secs(30),        // stale_time
///     Some(Duration::from_secs(300)), // cache_time
/// );
///
/// let client = Arc::new(QueryClient::with_config(config));
/// ```
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<DashMap<QueryKey, Box<dyn ErasedEntry>>>,
    invalidation_tx: broadcast::Sender<QueryKey>,
    config: QueryConfig,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a new query client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a new query client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let (invalidation_tx, _) = broadcast::channel(100);
        Self {
            cache: Arc::new(DashMap::new()),
            invalidation_tx,
            config,
        }
    }

    /// Gets the query configuration.
    #[must_use]
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Reads `key` through the cache.
    ///
    /// Fresh cached data is returned without calling `fetcher`. Otherwise the
    /// call joins the fetch already in flight for `key`, or starts one. Read
    /// failures are returned inside the result and retained in the cache; they
    /// are never raised.
    ///
    /// `fetcher` is invoked while the entry is locked and must only build the
    /// future; all work belongs inside the returned future.
    pub async fn fetch<V, F>(
        &self,
        key: &QueryKey,
        fetcher: F,
        options: &QueryOptions,
    ) -> QueryResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        if !options.enabled {
            return QueryResult::new(key.clone(), QueryState::Idle);
        }
        self.run_fetch(key, fetcher, options, false).await
    }

    /// Starts a new fetch for `key` even if fresh data or a fetch in flight
    /// exists. The superseded fetch's result is discarded when it lands.
    pub async fn refetch<V, F>(&self, key: &QueryKey, fetcher: F) -> QueryResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        self.run_fetch(key, fetcher, &QueryOptions::default(), true)
            .await
    }

    async fn run_fetch<V, F>(
        &self,
        key: &QueryKey,
        fetcher: F,
        options: &QueryOptions,
        force: bool,
    ) -> QueryResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        let stale_time = options.stale_time.unwrap_or(self.config.stale_time);

        let (generation, pending) = {
            let mut slot = self
                .cache
                .entry(key.clone())
                .or_insert_with(|| Box::new(CacheEntry::<V>::new()) as Box<dyn ErasedEntry>);
            let Some(entry) = slot.as_any_mut().downcast_mut::<CacheEntry<V>>() else {
                return type_mismatch(key);
            };

            if !force && entry.is_fresh(stale_time) {
                debug!(%key, "query cache hit");
                return entry.snapshot(key);
            }

            match entry.in_flight() {
                Some(in_flight) if !force => {
                    debug!(%key, generation = in_flight.0, "joining in-flight fetch");
                    in_flight
                }
                _ => {
                    let pending = fetcher().shared();
                    let generation = entry.begin(pending.clone());
                    debug!(%key, generation, "starting fetch");
                    (generation, pending)
                }
            }
        };

        let outcome = pending.await;
        self.settle(key, generation, outcome)
    }

    fn settle<V>(
        &self,
        key: &QueryKey,
        generation: u64,
        outcome: Result<V, QueryError>,
    ) -> QueryResult<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(mut slot) = self.cache.get_mut(key) else {
            // Removed while the fetch was running.
            return QueryResult::new(key.clone(), outcome_state(outcome));
        };
        let Some(entry) = slot.as_any_mut().downcast_mut::<CacheEntry<V>>() else {
            return type_mismatch(key);
        };

        let failure = outcome.as_ref().err().cloned();
        if entry.settle(generation, outcome) {
            if let Some(error) = failure {
                warn!(%key, generation, %error, "query fetch failed");
            }
        } else {
            debug!(
                %key,
                generation,
                current = entry.generation(),
                "discarding superseded fetch result"
            );
        }
        entry.snapshot(key)
    }

    /// Returns the current state of `key` without fetching.
    #[must_use]
    pub fn peek<V>(&self, key: &QueryKey) -> QueryResult<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        match self.cache.get(key) {
            Some(slot) => match slot.as_any().downcast_ref::<CacheEntry<V>>() {
                Some(entry) => entry.snapshot(key),
                None => type_mismatch(key),
            },
            None => QueryResult::new(key.clone(), QueryState::Idle),
        }
    }

    /// Returns cached data for `key` if it is fresh under `stale_time`.
    fn fresh<V>(&self, key: &QueryKey, stale_time: std::time::Duration) -> Option<QueryResult<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut slot = self.cache.get_mut(key)?;
        let entry = slot.as_any_mut().downcast_mut::<CacheEntry<V>>()?;
        entry.is_fresh(stale_time).then(|| entry.snapshot(key))
    }

    /// Gets the cached data for `key`, current or last-known-good.
    #[must_use]
    pub fn get_query_data<V>(&self, key: &QueryKey) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.cache
            .get(key)
            .and_then(|slot| slot.as_any().downcast_ref::<CacheEntry<V>>()?.data.clone())
    }

    /// Writes `data` into the cache as a fresh success, superseding any fetch in
    /// flight for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] if `key` already holds another type.
    pub fn set_query_data<V>(&self, key: &QueryKey, data: V) -> Result<(), QueryError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut slot = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| Box::new(CacheEntry::<V>::new()) as Box<dyn ErasedEntry>);
        let entry = slot
            .as_any_mut()
            .downcast_mut::<CacheEntry<V>>()
            .ok_or_else(|| QueryError::TypeMismatch(key.to_string()))?;
        entry.update(data);
        Ok(())
    }

    /// Invalidates every entry whose key starts with `prefix` and notifies
    /// active queries so they refetch.
    ///
    /// Returns the number of cached entries marked stale. Active queries are
    /// notified even when nothing is cached yet.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut marked = 0;
        for mut slot in self.cache.iter_mut() {
            if slot.key().starts_with(prefix) {
                slot.value_mut().mark_stale();
                marked += 1;
            }
        }
        debug!(%prefix, marked, "invalidated queries");
        // No receivers just means no active queries.
        let _ = self.invalidation_tx.send(prefix.clone());
        marked
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    pub fn remove(&self, key: &QueryKey) -> bool {
        self.cache.remove(key).is_some()
    }

    /// Removes entries idle for longer than [`QueryConfig::cache_time`].
    ///
    /// Does nothing when no cache time is configured. Returns the number of
    /// entries removed.
    pub fn collect_garbage(&self) -> usize {
        let Some(cache_time) = self.config.cache_time else {
            return 0;
        };
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.should_gc(cache_time));
        let removed = before.saturating_sub(self.cache.len());
        if removed > 0 {
            debug!(removed, "collected idle query entries");
        }
        removed
    }

    /// Subscribes to invalidation notifications.
    pub(crate) fn subscribe_invalidation(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidation_tx.subscribe()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn type_mismatch<V>(key: &QueryKey) -> QueryResult<V> {
    QueryResult::new(
        key.clone(),
        QueryState::Error {
            error: QueryError::TypeMismatch(key.to_string()),
            previous: None,
        },
    )
}

fn outcome_state<V>(outcome: Result<V, QueryError>) -> QueryState<V> {
    match outcome {
        Ok(data) => QueryState::Success {
            data,
            is_stale: false,
        },
        Err(error) => QueryState::Error {
            error,
            previous: None,
        },
    }
}

type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;

/// A query subscription that monitors and fetches data with caching.
///
/// `Query` is a subscription that automatically manages data fetching and caching.
/// When subscribed:
///
/// 1. If disabled, `Idle` is emitted once and nothing is fetched
/// 2. If fresh cached data exists, it's immediately emitted as `Success`
/// 3. Otherwise `Loading` is emitted and a fetch is triggered
/// 4. When a prefix of its key is invalidated, the query refetches
///
/// # Example
///
/// ```rust,ignore
/// use recall::subscription::{Subscription, http::{Query, QueryClient}};
/// use std::sync::Arc;
///
/// let client = Arc::new(QueryClient::new());
///
/// let query = Subscription::new(Query::new(
///     query_key!["/api/reports", 7],
///     || Box::pin(async { fetch_report(7).await }),
///     client.clone(),
/// ))
/// .map(Message::ReportQuery);
/// ```
pub struct Query<V> {
    key: QueryKey,
    fetcher: Fetcher<V>,
    client: Arc<QueryClient>,
    options: QueryOptions,
}

impl<V> Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new query with the given key, fetcher, and client.
    ///
    /// # Arguments
    ///
    /// * `key` - Identifies the cached read
    /// * `fetcher` - Builds the future that fetches the data
    /// * `client` - The query client for cache management
    pub fn new<F>(key: QueryKey, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key,
            fetcher: Arc::new(fetcher),
            client,
            options: QueryOptions::default(),
        }
    }

    /// Replaces the options of this query.
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    #[must_use]
    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Reads the query once through the cache without subscribing.
    pub async fn fetch(&self) -> QueryResult<V> {
        let fetcher = self.fetcher.clone();
        self.client
            .fetch(&self.key, move || fetcher(), &self.options)
            .await
    }
}

impl<V> SubscriptionSource for Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = QueryResult<V>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let key = self.key.clone();
        let fetcher = self.fetcher.clone();
        let client = self.client.clone();
        let options = self.options.clone();

        stream::unfold(State::Initial, move |state| {
            let key = key.clone();
            let fetcher = fetcher.clone();
            let client = client.clone();
            let options = options.clone();

            async move {
                match state {
                    State::Initial => {
                        if !options.enabled {
                            let result = QueryResult::new(key, QueryState::Idle);
                            return Some((result, State::Done));
                        }

                        // Subscribe before fetching so no invalidation is missed.
                        let rx = client.subscribe_invalidation();
                        let stale_time = options.stale_time.unwrap_or(client.config().stale_time);

                        if let Some(result) = client.fresh::<V>(&key, stale_time) {
                            // Fresh data: emit it, then wait for invalidation
                            Some((result, State::Watching { rx }))
                        } else {
                            let result = QueryResult::new(
                                key.clone(),
                                QueryState::Loading {
                                    previous: client.get_query_data(&key),
                                },
                            );
                            Some((result, State::Fetching { rx }))
                        }
                    }

                    State::Fetching { rx } => {
                        let result = client
                            .fetch(&key, move || fetcher(), &options)
                            .await;
                        Some((result, State::Watching { rx }))
                    }

                    State::Watching { mut rx } => loop {
                        match rx.recv().await {
                            Ok(prefix) if key.starts_with(&prefix) => {
                                let result = QueryResult::new(
                                    key.clone(),
                                    QueryState::Loading {
                                        previous: client.get_query_data(&key),
                                    },
                                );
                                return Some((result, State::Fetching { rx }));
                            }
                            Ok(_) => {
                                // Different key, keep waiting
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                // Missed notifications may have covered this key.
                                debug!(%key, skipped, "invalidation receiver lagged, refetching");
                                let result = QueryResult::new(
                                    key.clone(),
                                    QueryState::Loading {
                                        previous: client.get_query_data(&key),
                                    },
                                );
                                return Some((result, State::Fetching { rx }));
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    },

                    State::Done => None,
                }
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<V> Hash for Query<V> {
    fn hash<H>(&self, hasher: &mut H)
    where
        H: std::hash::Hasher,
    {
        self.key.hash(hasher);
        self.options.enabled.hash(hasher);
    }
}

/// Internal state machine for the Query subscription.
enum State {
    Initial,
    Fetching { rx: broadcast::Receiver<QueryKey> },
    Watching { rx: broadcast::Receiver<QueryKey> },
    Done,
}
