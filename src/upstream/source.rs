use std::future::Future;

use crate::upstream::stream::MessageStream;
use crate::utils::error::{ConnectError, SubscribeError};

/// Connection state of an upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    Failed,
}

/// A broker connection that yields one topic's messages.
///
/// `connect` must fail fast: retry policy belongs to the caller.
/// `subscribe` consumes the session, so a session is subscribed at most
/// once.
pub trait UpstreamSource: Send + Sync + 'static {
    type Session: Send + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, ConnectError>> + Send;

    fn subscribe(
        &self,
        session: Self::Session,
        topic: &str,
    ) -> impl Future<Output = Result<MessageStream, SubscribeError>> + Send;
}
