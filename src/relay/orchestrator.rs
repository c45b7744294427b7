//! Relay orchestrator
//!
//! Owns the upstream source and moves the process through
//! `Init → ConnectingUpstream → Subscribed → Serving → ShuttingDown →
//! Terminated`. While serving it forwards every upstream message into the
//! hub. When the upstream stream ends it goes back to `ConnectingUpstream`
//! and resubscribes; downstream connections are left alone and simply
//! receive nothing until the new subscription delivers.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use crate::config::UpstreamSettings;
use crate::hub::FanoutHub;
use crate::upstream::{MessageStream, UpstreamSource};
use crate::utils::error::{RelayError, UpstreamDisconnect};
use crate::utils::shutdown::Shutdown;

/// Process lifecycle, observable through [`Relay::watch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Init,
    ConnectingUpstream,
    Subscribed,
    Serving,
    ShuttingDown,
    Terminated,
}

/// Backoff between upstream connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed at startup. Reconnects after an outage never give up.
    pub connect_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&UpstreamSettings::default())
    }
}

impl From<&UpstreamSettings> for RetryPolicy {
    fn from(settings: &UpstreamSettings) -> Self {
        Self {
            connect_attempts: settings.connect_attempts.max(1),
            initial_delay: Duration::from_millis(settings.reconnect_delay_ms),
            max_delay: Duration::from_millis(
                settings.max_reconnect_delay_ms.max(settings.reconnect_delay_ms),
            ),
        }
    }
}

/// Drives one upstream subscription into a [`FanoutHub`].
///
/// `start` establishes the first subscription, `run` serves and reconnects
/// until shutdown, and `terminate` records the final state.
pub struct Relay<S: UpstreamSource> {
    source: S,
    hub: FanoutHub,
    topic: String,
    retry: RetryPolicy,
    state: watch::Sender<RelayState>,
}

impl<S: UpstreamSource> Relay<S> {
    /// Creates a relay in `Init` that will subscribe `source` to `topic`.
    pub fn new(source: S, hub: FanoutHub, topic: impl Into<String>, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(RelayState::Init);
        Self {
            source,
            hub,
            topic: topic.into(),
            retry,
            state,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Connects and subscribes, retrying `ConnectError` up to the startup
    /// limit. Returns `Ok(None)` if shutdown was requested first.
    pub async fn start(&self, shutdown: &mut Shutdown) -> Result<Option<MessageStream>, RelayError> {
        self.establish(Some(self.retry.connect_attempts), shutdown)
            .await
    }

    /// Serves until shutdown, reconnecting whenever the upstream drops.
    ///
    /// Only a subscription rejected during reconnect ends this early with
    /// an error.
    pub async fn run(&self, mut stream: MessageStream, mut shutdown: Shutdown) -> Result<(), RelayError> {
        let outcome = loop {
            self.transition(RelayState::Serving);
            let disconnect = tokio::select! {
                _ = shutdown.signalled() => break Ok(()),
                disconnect = self.forward(&mut stream) => disconnect,
            };

            warn!(reason = %disconnect.reason, topic = %self.topic, "Upstream lost, reconnecting");
            match self.establish(None, &mut shutdown).await {
                Ok(Some(next)) => stream = next,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.transition(RelayState::ShuttingDown);
        drop(stream);
        outcome
    }

    /// Marks the relay as fully stopped once the rest of the process has
    /// released its resources.
    pub fn terminate(&self) {
        self.transition(RelayState::ShuttingDown);
        self.transition(RelayState::Terminated);
    }

    async fn forward(&self, stream: &mut MessageStream) -> UpstreamDisconnect {
        loop {
            match stream.next().await {
                Ok(message) => {
                    let seq = message.seq;
                    let offered = self.hub.publish(message);
                    trace!(seq, offered, "Relayed upstream message");
                }
                Err(disconnect) => return disconnect,
            }
        }
    }

    async fn establish(
        &self,
        limit: Option<u32>,
        shutdown: &mut Shutdown,
    ) -> Result<Option<MessageStream>, RelayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.transition(RelayState::ConnectingUpstream);

            let connected = tokio::select! {
                _ = shutdown.signalled() => return Ok(None),
                connected = self.source.connect() => connected,
            };

            let err = match connected {
                Ok(session) => {
                    let subscribed = tokio::select! {
                        _ = shutdown.signalled() => return Ok(None),
                        subscribed = self.source.subscribe(session, &self.topic) => subscribed,
                    };
                    return match subscribed {
                        Ok(stream) => {
                            self.transition(RelayState::Subscribed);
                            info!(topic = %self.topic, attempt, "Subscribed to upstream topic");
                            Ok(Some(stream))
                        }
                        Err(e) => {
                            error!(error = %e, "Upstream subscription rejected");
                            Err(e.into())
                        }
                    };
                }
                Err(err) => err,
            };

            if limit.is_some_and(|limit| attempt >= limit) {
                error!(error = %err, attempt, "Giving up on upstream connection");
                return Err(err.into());
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Upstream connect failed, retrying"
            );
            tokio::select! {
                _ = shutdown.signalled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn transition(&self, next: RelayState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Relay state changed");
        }
    }
}
