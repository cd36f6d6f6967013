//! Long-lived event sources and their lifecycle.
//!
//! A [`Subscription`] wraps a [`SubscriptionSource`], an identifiable factory for
//! a message stream. The [`SubscriptionManager`] mounts subscriptions, keeps
//! each one running while it stays in the desired set, and disposes of it when
//! it leaves. Messages produced by a disposed subscription are never delivered.

pub mod http;
mod manager;
pub mod mock;

use std::any::TypeId;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use manager::SubscriptionManager;

/// Identity of a subscription, combining its source type and a hash of its
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    #[must_use]
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of messages that can be subscribed to.
pub trait SubscriptionSource: Send + 'static {
    type Output;

    /// Creates the stream of outputs. Called once per mount.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    /// Sources with equal ids are considered the same subscription.
    fn id(&self) -> SubscriptionId;
}

/// A type-erased subscription producing messages of type `T`.
pub struct Subscription<T> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Box<dyn FnOnce() -> BoxStream<'static, T> + Send>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = T>,
    {
        let id = source.id();
        Self {
            id,
            spawn: Box::new(move || source.stream()),
        }
    }

    /// Converts every output of this subscription. The id is unchanged.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        let spawn = self.spawn;
        Subscription {
            id: self.id,
            spawn: Box::new(move || spawn().map(f).boxed()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Handle for a running subscription task
pub struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Handle {
    pub const fn new(token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { token, join }
    }

    /// Signal the task to stop without waiting for it.
    pub fn dispose(&self) {
        self.token.cancel();
    }

    /// Cancel the subscription and wait for task completion
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSource;
    use super::*;

    #[test]
    fn test_subscription_id_depends_on_type() {
        struct A;
        struct B;
        assert_eq!(SubscriptionId::of::<A>(1), SubscriptionId::of::<A>(1));
        assert_ne!(SubscriptionId::of::<A>(1), SubscriptionId::of::<A>(2));
        assert_ne!(SubscriptionId::of::<A>(1), SubscriptionId::of::<B>(1));
    }

    #[tokio::test]
    async fn test_map_keeps_id_and_converts() {
        let mock = MockSource::<i32>::new();
        let sub = Subscription::new(mock.clone());
        let id = sub.id();

        let mapped = sub.map(|n| n.to_string());
        assert_eq!(mapped.id(), id);

        let mut stream = (mapped.spawn)();
        mock.emit(7).expect("stream is subscribed");
        assert_eq!(stream.next().await, Some("7".to_owned()));
    }
}
