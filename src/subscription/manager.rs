use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Handle, Subscription, SubscriptionId};

/// A message tagged with the mount that produced it.
struct Delivery<Msg> {
    id: SubscriptionId,
    epoch: u64,
    message: Msg,
}

struct Mounted {
    epoch: u64,
    handle: Handle,
}

/// Mounts and disposes subscriptions, and delivers their messages.
///
/// Call [`update`](Self::update) with the full set of subscriptions the owner
/// currently wants. New ids are mounted, ids that disappeared are disposed, and
/// ids present in both keep running undisturbed.
///
/// Every mount gets a fresh epoch. [`recv`](Self::recv) drops any message whose
/// mount has since been disposed, so a subscription that is unmounted while its
/// fetch is still running can never update the owner afterwards.
pub struct SubscriptionManager<Msg> {
    active: HashMap<SubscriptionId, Mounted>,
    next_epoch: u64,
    tx: mpsc::UnboundedSender<Delivery<Msg>>,
    rx: mpsc::UnboundedReceiver<Delivery<Msg>>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            active: HashMap::new(),
            next_epoch: 0,
            tx,
            rx,
        }
    }

    /// Reconciles running subscriptions with `subscriptions`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn update(&mut self, subscriptions: impl IntoIterator<Item = Subscription<Msg>>) {
        let mut desired = HashSet::new();
        let mut to_mount = Vec::new();
        for subscription in subscriptions {
            if desired.insert(subscription.id) && !self.active.contains_key(&subscription.id) {
                to_mount.push(subscription);
            }
        }

        self.active.retain(|id, mounted| {
            let keep = desired.contains(id);
            if !keep {
                debug!(?id, epoch = mounted.epoch, "disposing subscription");
                mounted.handle.dispose();
            }
            keep
        });

        for subscription in to_mount {
            self.mount(subscription);
        }
    }

    fn mount(&mut self, subscription: Subscription<Msg>) {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let id = subscription.id;

        let token = CancellationToken::new();
        let child = token.clone();
        let tx = self.tx.clone();
        let mut stream = (subscription.spawn)();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = child.cancelled() => break,
                    item = stream.next() => match item {
                        Some(message) => {
                            if tx.send(Delivery { id, epoch, message }).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        debug!(?id, epoch, "mounted subscription");
        self.active.insert(
            id,
            Mounted {
                epoch,
                handle: Handle::new(token, join),
            },
        );
    }

    fn is_current(&self, delivery: &Delivery<Msg>) -> bool {
        self.active
            .get(&delivery.id)
            .is_some_and(|mounted| mounted.epoch == delivery.epoch)
    }

    /// Waits for the next message from a currently mounted subscription.
    ///
    /// Pends forever while nothing is mounted and nothing is queued.
    pub async fn recv(&mut self) -> Option<Msg> {
        while let Some(delivery) = self.rx.recv().await {
            if self.is_current(&delivery) {
                return Some(delivery.message);
            }
            debug!(
                id = ?delivery.id,
                epoch = delivery.epoch,
                "dropping message from disposed subscription"
            );
        }
        None
    }

    /// Returns the next queued message from a mounted subscription, if any.
    pub fn try_recv(&mut self) -> Option<Msg> {
        while let Ok(delivery) = self.rx.try_recv() {
            if self.is_current(&delivery) {
                return Some(delivery.message);
            }
        }
        None
    }

    #[must_use]
    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.active.contains_key(&id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Disposes every subscription and waits for their tasks to finish.
    pub async fn shutdown(&mut self) {
        for (_, mounted) in self.active.drain() {
            mounted.handle.cancel().await;
        }
    }
}

impl<Msg: Send + 'static> Default for SubscriptionManager<Msg> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Msg> Drop for SubscriptionManager<Msg> {
    fn drop(&mut self) {
        for mounted in self.active.values() {
            mounted.handle.dispose();
        }
    }
}
