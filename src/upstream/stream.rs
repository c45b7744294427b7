use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::hub::Message;
use crate::utils::error::UpstreamDisconnect;

#[derive(Debug)]
enum Event {
    Message(Message),
    Disconnected(UpstreamDisconnect),
}

/// Creates a connected feed/stream pair for one upstream subscription.
///
/// The feed side is driven by whatever reads from the broker; the stream
/// side is handed to the relay.
pub fn message_stream(topic: impl Into<String>) -> (UpstreamFeed, MessageStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let feed = UpstreamFeed {
        sender,
        next_seq: AtomicU64::new(0),
    };
    let stream = MessageStream {
        receiver,
        topic: topic.into(),
        ended: None,
    };
    (feed, stream)
}

/// Producing half of a [`MessageStream`].
///
/// Stamps every payload with its arrival order and arrival time.
#[derive(Debug)]
pub struct UpstreamFeed {
    sender: UnboundedSender<Event>,
    next_seq: AtomicU64,
}

impl UpstreamFeed {
    /// Pushes one payload. Returns `false` once the stream has been dropped.
    pub fn push(&self, payload: impl Into<Bytes>) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(Event::Message(Message::new(seq, payload)))
            .is_ok()
    }

    /// Ends the stream with a terminal disconnect signal.
    pub fn disconnect(self, reason: impl Into<String>) {
        let _ = self
            .sender
            .send(Event::Disconnected(UpstreamDisconnect::new(reason)));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the consuming [`MessageStream`] has been dropped.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

/// Unbounded, push-based sequence of upstream messages.
///
/// It only ends when the upstream session is lost. After that every call
/// to [`next`](Self::next) returns the same disconnect.
#[derive(Debug)]
pub struct MessageStream {
    receiver: UnboundedReceiver<Event>,
    topic: String,
    ended: Option<UpstreamDisconnect>,
}

impl MessageStream {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn next(&mut self) -> Result<Message, UpstreamDisconnect> {
        if let Some(disconnect) = &self.ended {
            return Err(disconnect.clone());
        }
        let disconnect = match self.receiver.recv().await {
            Some(Event::Message(message)) => return Ok(message),
            Some(Event::Disconnected(disconnect)) => disconnect,
            None => UpstreamDisconnect::new("upstream feed dropped"),
        };
        self.ended = Some(disconnect.clone());
        Err(disconnect)
    }
}
