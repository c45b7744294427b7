//! Fan-out engine
//!
//! Turns the single upstream message sequence into independent,
//! per-subscriber queues:
//! - `register` creates a bounded queue and hands back its receiving side
//! - `publish` offers each message to every queue with `try_send`, so a
//!   stalled subscriber never blocks the publisher or its peers
//! - a subscriber whose queue is full is evicted and its handle reports
//!   `SubscriberOverflowError` on the next receive
//!
//! Concurrency notes:
//! - `FanoutHub` is a cheap clone around `Arc<Mutex<Registry>>`. The lock is
//!   only held for in-memory bookkeeping and never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::message::Message;
use crate::hub::registry::{Registry, Tap};
use crate::hub::subscriber::{SubscriberHandle, TapState, TapStatus};

/// Copies every published message into each subscriber's bounded queue.
///
/// Clones share the same registry.
#[derive(Debug, Clone)]
pub struct FanoutHub {
    registry: Arc<Mutex<Registry>>,
    backlog: usize,
}

impl FanoutHub {
    /// Default number of undelivered messages a subscriber may accumulate
    /// before it is evicted.
    pub const DEFAULT_BACKLOG: usize = 1024;

    /// Creates a hub with [`DEFAULT_BACKLOG`](Self::DEFAULT_BACKLOG).
    pub fn new() -> Self {
        Self::with_backlog(Self::DEFAULT_BACKLOG)
    }

    /// A zero backlog is raised to one.
    pub fn with_backlog(backlog: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            backlog: backlog.max(1),
        }
    }

    pub fn backlog(&self) -> usize {
        self.backlog
    }

    /// Registers a new subscriber with an empty backlog.
    ///
    /// The subscriber sees every message published after this call returns
    /// and nothing published before it.
    pub fn register(&self) -> SubscriberHandle {
        let id = format!("client-{}", Uuid::new_v4());
        let (sender, receiver) = mpsc::channel(self.backlog);
        let status = TapStatus::default();

        let mut registry = self.lock();
        registry.insert(
            id.clone(),
            Tap {
                sender,
                status: status.clone(),
            },
        );
        debug!(subscriber = %id, subscribers = registry.len(), "Subscriber registered");
        drop(registry);

        SubscriberHandle::new(
            id,
            receiver,
            status,
            self.backlog,
            Arc::downgrade(&self.registry),
        )
    }

    /// Removes a subscriber and discards its undelivered backlog.
    ///
    /// Returns `false` if the subscriber was not registered, which makes
    /// repeated calls harmless.
    pub fn deregister(&self, id: &str) -> bool {
        let mut registry = self.lock();
        match registry.remove(id) {
            Some(tap) => {
                tap.status.mark(TapState::Deregistered);
                debug!(subscriber = %id, subscribers = registry.len(), "Subscriber deregistered");
                true
            }
            None => false,
        }
    }

    /// Enqueues `message` for every registered subscriber.
    ///
    /// Never waits on a subscriber. Returns how many subscribers accepted
    /// the message.
    pub fn publish(&self, message: Message) -> usize {
        let mut registry = self.lock();
        let offer = registry.offer(&message);

        for id in &offer.overflowed {
            if let Some(tap) = registry.remove(id) {
                tap.status.mark(TapState::Evicted);
                warn!(
                    subscriber = %id,
                    backlog = self.backlog,
                    "Subscriber backlog full, evicting"
                );
            }
        }
        for id in &offer.closed {
            if registry.remove(id).is_some() {
                debug!(subscriber = %id, "Removed subscriber with closed queue");
            }
        }

        offer.delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
