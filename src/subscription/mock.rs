//! Mock subscription source for testing.
//!
//! This module provides controllable subscription sources that emit values on demand,
//! enabling deterministic testing of subscription lifecycles without real I/O.
//!
//! # Basic Usage
//!
//! ```
//! use recall::subscription::{Subscription, mock::MockSource};
//!
//! let mock = MockSource::<i32>::new();
//! let subscription = Subscription::new(mock.clone());
//!
//! // Emitting requires at least one mounted stream
//! assert!(mock.emit(42).is_err());
//! ```
//!
//! # Dynamic Subscriptions
//!
//! Test subscriptions that change based on owner state:
//!
//! ```
//! # use recall::subscription::{Subscription, mock::MockSource};
//! struct Page {
//!     enabled: bool,
//!     mock: MockSource<i32>,
//! }
//!
//! impl Page {
//!     fn subscriptions(&self) -> Vec<Subscription<i32>> {
//!         if self.enabled {
//!             vec![Subscription::new(self.mock.clone())]
//!         } else {
//!             vec![]
//!         }
//!     }
//! }
//!
//! let mock = MockSource::new();
//! let page = Page { enabled: true, mock: mock.clone() };
//! assert_eq!(page.subscriptions().len(), 1);
//!
//! let page = Page { enabled: false, mock: mock.clone() };
//! assert_eq!(page.subscriptions().len(), 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;

use crate::subscription::{SubscriptionId, SubscriptionSource};

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A mock subscription source that emits values on demand.
///
/// Uses a broadcast channel internally, so it can be cloned and shared between
/// the test code and the owner's `subscriptions()` method. Every instance
/// created with [`new`](Self::new) has its own id; clones share it.
#[derive(Debug, Clone)]
pub struct MockSource<T: Clone> {
    sender: broadcast::Sender<T>,
    id: SubscriptionId,
}

impl<T: Clone + 'static> MockSource<T> {
    /// Creates a new mock subscription source.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of buffered messages (defaults to 100 if using `new()`)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            sender: tx,
            id: SubscriptionId::of::<Self>(NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Creates a new mock subscription source with default capacity (100).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Emits a value from the subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no active receivers.
    pub fn emit(&self, value: T) -> Result<usize, broadcast::error::SendError<T>> {
        self.sender.send(value)
    }

    /// Returns the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + 'static> Default for MockSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriptionSource for MockSource<T> {
    type Output = T;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let rx = self.sender.subscribe();
        tokio_stream::wrappers::BroadcastStream::new(rx)
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        self.id
    }
}
