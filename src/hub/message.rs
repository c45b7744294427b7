use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A message received from the upstream broker.
///
/// The relay never looks inside `payload`; every subscriber gets the same
/// bytes. Cloning is cheap because `Bytes` is reference counted.
///
/// # Fields
///
/// - `seq` - Arrival order within the upstream stream that produced it.
/// - `received_at` - When the relay received the message.
/// - `payload` - The raw message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub payload: Bytes,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(seq: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            received_at: Utc::now(),
            payload: payload.into(),
        }
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
