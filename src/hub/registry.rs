use std::collections::HashMap;

use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;

use crate::hub::message::Message;
use crate::hub::subscriber::TapStatus;

pub type SubscriberId = String;

/// One registered subscriber: the sending half of its private queue and
/// the status flag shared with its handle.
#[derive(Debug)]
pub(crate) struct Tap {
    pub(crate) sender: Sender<Message>,
    pub(crate) status: TapStatus,
}

/// Result of offering one message to every tap.
#[derive(Debug, Default)]
pub(crate) struct Offer {
    pub(crate) delivered: usize,
    pub(crate) overflowed: Vec<SubscriberId>,
    pub(crate) closed: Vec<SubscriberId>,
}

/// The set of subscribers currently attached to the hub.
///
/// Subscribers are keyed by id; inserting an id twice replaces the old tap.
/// The registry itself is not synchronized, `FanoutHub` keeps it behind a
/// mutex.
#[derive(Debug, Default)]
pub struct Registry {
    taps: HashMap<SubscriberId, Tap>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            taps: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: SubscriberId, tap: Tap) {
        self.taps.insert(id, tap);
    }

    /// Removes a subscriber, returning its tap if it was still registered.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Tap> {
        self.taps.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.taps.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Enqueues `message` on every tap without waiting on any of them.
    ///
    /// Taps whose queue is full or whose handle is gone are reported back
    /// to the caller and left in place.
    pub(crate) fn offer(&self, message: &Message) -> Offer {
        let mut offer = Offer::default();
        for (id, tap) in &self.taps {
            match tap.sender.try_send(message.clone()) {
                Ok(()) => offer.delivered += 1,
                Err(TrySendError::Full(_)) => offer.overflowed.push(id.clone()),
                Err(TrySendError::Closed(_)) => offer.closed.push(id.clone()),
            }
        }
        offer
    }
}
