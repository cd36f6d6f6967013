//! HTTP mutation operations for creating, updating, or deleting resources.
//!
//! This module provides the [`Mutation`] runner for writes (POST, PUT, PATCH,
//! DELETE), similar to mutations in TanStack Query.
//!
//! # Design Pattern: Caller-driven Invalidation
//!
//! A mutation never touches the query cache by itself. After a successful write,
//! the caller invalidates the queries the write affected. This keeps mutations
//! decoupled from cache layout.
//!
//! Invocations are not serialized: calling [`Mutation::run`] while an earlier
//! call is still pending starts a second request. Callers that must prevent this
//! gate their trigger on [`Mutation::is_pending`].
//!
//! # Example
//!
//! ```rust,ignore
//! use recall::subscription::http::{Mutation, MutationError};
//!
//! let create_tag = api.create_tag();
//! if !create_tag.is_pending() {
//!     match create_tag.run(NewTag::new("math")).await {
//!         Ok(tag) => {
//!             queries.invalidate(&keys::tags());
//!         }
//!         Err(e) => status = e.to_string(),
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::Command;

use super::fetch::{HttpError, ResponseBody, status_prefix};

/// A failed write. Carries the same shape as [`HttpError`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}{message}", status_prefix(.status_code.as_ref()))]
pub struct MutationError {
    pub status_code: Option<u16>,
    pub message: String,
    pub body: Option<ResponseBody>,
}

impl MutationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            body: None,
        }
    }
}

impl From<HttpError> for MutationError {
    fn from(error: HttpError) -> Self {
        Self {
            status_code: error.status_code,
            message: error.message,
            body: error.body,
        }
    }
}

/// The state of a mutation record.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    /// Mutation is idle (not yet started).
    Idle,
    /// Mutation is in progress.
    Pending,
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed with an error.
    Error(MutationError),
}

/// The record of the latest invocation of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord<T> {
    /// The current state of the mutation.
    pub state: MutationState<T>,
}

impl<T> MutationRecord<T> {
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            state: MutationState::Idle,
        }
    }

    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed.
    pub const fn error(&self) -> Option<&MutationError> {
        match &self.state {
            MutationState::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if the mutation has not run since creation or reset.
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, MutationState::Idle)
    }

    /// Returns `true` if the mutation is currently pending.
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, MutationState::Pending)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, MutationError>> + Send + Sync>;

struct Status<O> {
    in_flight: AtomicUsize,
    latest: AtomicU64,
    record: Mutex<MutationRecord<O>>,
}

impl<O> Status<O> {
    fn record(&self) -> MutexGuard<'_, MutationRecord<O>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the in-flight count when an invocation settles or is dropped.
///
/// An invocation dropped before settling returns its record to idle, unless
/// a later invocation or a reset has taken the record over.
struct InFlight<O> {
    status: Arc<Status<O>>,
    invocation: u64,
}

impl<O> Drop for InFlight<O> {
    fn drop(&mut self) {
        self.status.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.status.latest.load(Ordering::SeqCst) == self.invocation {
            let mut record = self.status.record();
            if record.is_pending() {
                debug!(invocation = self.invocation, "mutation dropped before settling");
                *record = MutationRecord::idle();
            }
        }
    }
}

/// A runner for data modifications (POST, PUT, PATCH, DELETE).
///
/// Cloning a `Mutation` shares its status; all clones see the same pending flag
/// and record.
pub struct Mutation<I, O> {
    mutator: Mutator<I, O>,
    status: Arc<Status<O>>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            mutator: self.mutator.clone(),
            status: self.status.clone(),
        }
    }
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    /// Creates a runner around an async mutator.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recall::subscription::http::{Mutation, MutationError};
    ///
    /// let double = Mutation::new(|n: i32| Box::pin(async move { Ok::<_, MutationError>(n * 2) }));
    /// assert!(!double.is_pending());
    /// ```
    pub fn new<F>(mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, MutationError>> + Send + Sync + 'static,
    {
        Self {
            mutator: Arc::new(mutator),
            status: Arc::new(Status {
                in_flight: AtomicUsize::new(0),
                latest: AtomicU64::new(0),
                record: Mutex::new(MutationRecord::idle()),
            }),
        }
    }

    /// Returns `true` while any invocation has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The record of the most recently started invocation.
    #[must_use]
    pub fn record(&self) -> MutationRecord<O> {
        self.status.record().clone()
    }

    /// Returns the record to idle. Invocations still in flight no longer update it.
    pub fn reset(&self) {
        self.status.latest.fetch_add(1, Ordering::SeqCst);
        *self.status.record() = MutationRecord::idle();
    }

    /// Executes the mutation.
    ///
    /// # Errors
    ///
    /// Returns the [`MutationError`] produced by the mutator. Failures are
    /// never retried.
    pub async fn run(&self, input: I) -> Result<O, MutationError> {
        let invocation = self.status.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = InFlight {
            status: self.status.clone(),
            invocation,
        };
        *self.status.record() = MutationRecord {
            state: MutationState::Pending,
        };

        let outcome = (self.mutator)(input).await;

        match &outcome {
            Ok(_) => debug!(invocation, "mutation succeeded"),
            Err(error) => warn!(invocation, %error, "mutation failed"),
        }

        // Only the latest invocation owns the record.
        if self.status.latest.load(Ordering::SeqCst) == invocation {
            let state = match &outcome {
                Ok(output) => MutationState::Success(output.clone()),
                Err(error) => MutationState::Error(error.clone()),
            };
            *self.status.record() = MutationRecord { state };
        }
        drop(in_flight);
        outcome
    }

    /// Executes the mutation as a `Command`.
    ///
    /// The returned command produces `Result<O, MutationError>` which can be
    /// mapped to your application's message type using [`Command::map`].
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// fn update(&mut self, msg: Message) -> Command<Message> {
    ///     match msg {
    ///         Message::SubmitTag(name) => self
    ///             .create_tag
    ///             .mutate(NewTag::new(name))
    ///             .map(|result| match result {
    ///                 Ok(tag) => Message::TagCreated(tag),
    ///                 Err(e) => Message::CreateFailed(e.to_string()),
    ///             }),
    ///         // ...
    ///     }
    /// }
    /// ```
    pub fn mutate(&self, input: I) -> Command<Result<O, MutationError>> {
        let this = self.clone();
        Command::future(async move { this.run(input).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    fn doubler() -> Mutation<i32, i32> {
        Mutation::new(|n: i32| -> BoxFuture<'static, Result<i32, MutationError>> {
            Box::pin(async move {
                if n < 0 {
                    Err(MutationError::from(HttpError::with_status(400, "negative", None)))
                } else {
                    Ok(n * 2)
                }
            })
        })
    }

    /// Only the first invocation waits for `gate`; later ones finish at once.
    fn gated(gate: oneshot::Receiver<()>) -> Mutation<i32, i32> {
        let gate = Arc::new(Mutex::new(Some(gate)));
        Mutation::new(move |n: i32| -> BoxFuture<'static, Result<i32, MutationError>> {
            let gate = gate.lock().expect("lock").take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(n)
            })
        })
    }

    #[test]
    fn test_mutation_record_data() {
        let record = MutationRecord {
            state: MutationState::Success(42),
        };
        assert_eq!(record.data(), Some(&42));

        let record: MutationRecord<i32> = MutationRecord::idle();
        assert_eq!(record.data(), None);

        let record: MutationRecord<i32> = MutationRecord {
            state: MutationState::Pending,
        };
        assert_eq!(record.data(), None);

        let record: MutationRecord<i32> = MutationRecord {
            state: MutationState::Error(MutationError::new("error")),
        };
        assert_eq!(record.data(), None);
        assert_eq!(record.error().map(|e| e.message.as_str()), Some("error"));
    }

    #[test]
    fn test_mutation_record_predicates() {
        let idle: MutationRecord<i32> = MutationRecord::idle();
        assert!(idle.is_idle());
        assert!(!idle.is_pending());
        assert!(!idle.is_success());
        assert!(!idle.is_error());

        let pending: MutationRecord<i32> = MutationRecord {
            state: MutationState::Pending,
        };
        assert!(pending.is_pending());

        let success = MutationRecord {
            state: MutationState::Success(42),
        };
        assert!(success.is_success());

        let error: MutationRecord<i32> = MutationRecord {
            state: MutationState::Error(MutationError::new("error")),
        };
        assert!(error.is_error());
    }

    #[test]
    fn test_mutation_error_keeps_http_shape() {
        let err = MutationError::from(HttpError::with_status(
            400,
            "Validation error",
            Some(ResponseBody::Text("bad".to_owned())),
        ));
        assert_eq!(err.status_code, Some(400));
        assert_eq!(err.message, "Validation error");
        assert_eq!(err.body, Some(ResponseBody::Text("bad".to_owned())));
        assert_eq!(err.to_string(), "400: Validation error");

        assert_eq!(MutationError::from(HttpError::network()).to_string(), "network error");
    }

    #[tokio::test]
    async fn test_run_success_and_failure() {
        let mutation = doubler();

        assert_eq!(mutation.run(4).await, Ok(8));
        assert_eq!(mutation.record().data(), Some(&8));

        let err = mutation.run(-1).await.expect_err("negative input fails");
        assert_eq!(err.status_code, Some(400));
        assert!(mutation.record().is_error());
        assert!(!mutation.is_pending());
    }

    #[tokio::test]
    async fn test_pending_flag_while_running() {
        let (release, gate) = oneshot::channel::<()>();
        let mutation = gated(gate);

        let runner = mutation.clone();
        let task = tokio::spawn(async move { runner.run(1).await });

        while !mutation.is_pending() {
            tokio::task::yield_now().await;
        }
        assert!(mutation.record().is_pending());

        release.send(()).expect("runner is waiting");
        assert_eq!(task.await.expect("task completes"), Ok(1));
        assert!(!mutation.is_pending());
        assert_eq!(mutation.record().data(), Some(&1));
    }

    #[tokio::test]
    async fn test_reinvocation_is_not_serialized() {
        let (release, gate) = oneshot::channel::<()>();
        let mutation = gated(gate);

        let slow = mutation.clone();
        let first = tokio::spawn(async move { slow.run(1).await });
        while !mutation.is_pending() {
            tokio::task::yield_now().await;
        }

        // The second call completes while the first is still waiting.
        assert_eq!(mutation.run(2).await, Ok(2));
        assert!(mutation.is_pending());
        assert_eq!(mutation.record().data(), Some(&2));

        release.send(()).expect("first call is waiting");
        assert_eq!(first.await.expect("task completes"), Ok(1));
        // The record belongs to the latest invocation.
        assert_eq!(mutation.record().data(), Some(&2));
        assert!(!mutation.is_pending());
    }

    #[tokio::test]
    async fn test_dropped_invocation_returns_record_to_idle() {
        let (_release, gate) = oneshot::channel::<()>();
        let mutation = gated(gate);

        assert!(timeout(Duration::from_millis(10), mutation.run(1)).await.is_err());
        assert!(!mutation.is_pending());
        assert!(mutation.record().is_idle());
    }

    #[tokio::test]
    async fn test_dropped_invocation_keeps_later_record() {
        let (_release, gate) = oneshot::channel::<()>();
        let mutation = gated(gate);

        let mut first = Box::pin(mutation.run(1));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert_eq!(mutation.run(2).await, Ok(2));

        drop(first);
        assert!(!mutation.is_pending());
        assert_eq!(mutation.record().data(), Some(&2));
    }

    #[tokio::test]
    async fn test_reset() {
        let mutation = doubler();
        mutation.run(1).await.expect("succeeds");
        mutation.reset();
        assert!(mutation.record().is_idle());
    }

    #[tokio::test]
    async fn test_mutate_command() {
        let mutation = doubler();
        let mut stream = mutation.mutate(21).into_stream().expect("stream should exist");
        assert_eq!(stream.next().await, Some(Ok(42)));
        assert!(stream.next().await.is_none());
    }
}
