use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;

use crate::hub::message::Message;
use crate::hub::registry::{Registry, SubscriberId};
use crate::utils::error::{RecvError, SubscriberOverflowError};

/// Lifecycle of a tap as seen from its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    Active,
    /// Removed by the hub because its backlog was full.
    Evicted,
    /// Removed by an explicit `deregister`.
    Deregistered,
}

/// Status flag shared between a registry entry and its handle.
#[derive(Debug, Clone)]
pub(crate) struct TapStatus(Arc<watch::Sender<TapState>>);

impl Default for TapStatus {
    fn default() -> Self {
        Self(Arc::new(watch::Sender::new(TapState::Active)))
    }
}

impl TapStatus {
    pub(crate) fn get(&self) -> TapState {
        *self.0.borrow()
    }

    /// Only the first transition away from `Active` sticks.
    pub(crate) fn mark(&self, state: TapState) {
        if state == TapState::Active {
            return;
        }
        self.0.send_if_modified(|current| {
            if *current != TapState::Active {
                return false;
            }
            *current = state;
            true
        });
    }

    fn subscribe(&self) -> watch::Receiver<TapState> {
        self.0.subscribe()
    }
}

/// A subscriber's private, ordered view of the hub.
///
/// Dropping the handle deregisters it.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    receiver: Receiver<Message>,
    status: TapStatus,
    backlog: usize,
    registry: Weak<Mutex<Registry>>,
}

impl SubscriberHandle {
    pub(crate) fn new(
        id: SubscriberId,
        receiver: Receiver<Message>,
        status: TapStatus,
        backlog: usize,
        registry: Weak<Mutex<Registry>>,
    ) -> Self {
        Self {
            id,
            receiver,
            status,
            backlog,
            registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TapState {
        self.status.get()
    }

    /// Waits for the next message.
    ///
    /// Once the hub has evicted or deregistered this handle, any backlog
    /// still queued is discarded and an error is returned instead.
    pub async fn recv(&mut self) -> Result<Message, RecvError> {
        self.ensure_active()?;
        match self.receiver.recv().await {
            Some(message) => Ok(message),
            None => Err(self.ended()),
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). `Ok(None)` means the
    /// backlog is currently empty.
    pub fn try_recv(&mut self) -> Result<Option<Message>, RecvError> {
        self.ensure_active()?;
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.ended()),
        }
    }

    /// Resolves once the hub has evicted or deregistered this handle.
    ///
    /// Lets a consumer that is stuck on something other than `recv` notice
    /// that its subscription is gone.
    pub async fn removed(&self) {
        let mut status = self.status.subscribe();
        let _ = status.wait_for(|state| *state != TapState::Active).await;
    }

    fn ensure_active(&self) -> Result<(), RecvError> {
        match self.status.get() {
            TapState::Active => Ok(()),
            _ => Err(self.ended()),
        }
    }

    fn ended(&self) -> RecvError {
        match self.status.get() {
            TapState::Evicted => RecvError::Overflow(SubscriberOverflowError {
                subscriber: self.id.clone(),
                backlog: self.backlog,
            }),
            _ => RecvError::Closed,
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tap) = registry.remove(&self.id) {
                tap.status.mark(TapState::Deregistered);
                tracing::debug!(subscriber = %self.id, "Subscriber handle dropped");
            }
        }
    }
}
