use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::hub::FanoutHub;
use crate::transport::connection::ConnectionManager;
use crate::utils::shutdown::Shutdown;

/// Pause after a failed `accept` (e.g. out of file descriptors) so the loop
/// does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Downstream WebSocket server.
///
/// Every accepted connection is handed to the `ConnectionManager` in its own
/// task, so accepting never waits on delivery.
pub struct Server {
    listener: TcpListener,
    manager: ConnectionManager,
}

impl Server {
    pub async fn bind(addr: &str, hub: FanoutHub, shutdown: Shutdown) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            manager: ConnectionManager::new(hub, shutdown),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until shutdown, then waits for every delivery
    /// loop to finish.
    pub async fn run(self) {
        let Server { listener, manager } = self;
        let mut shutdown = manager.shutdown();
        let mut connections = JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!("WebSocket server listening on ws://{addr}");
        }

        loop {
            tokio::select! {
                _ = shutdown.signalled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let manager = manager.clone();
                        connections.spawn(async move { manager.on_accept(stream, peer).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        drop(listener);
        info!(open = connections.len(), "WebSocket server stopping");
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task failed");
            }
        }
        info!("WebSocket server stopped");
    }
}

/// Binds `addr` and serves until shutdown.
pub async fn start_websocket_server(
    addr: &str,
    hub: FanoutHub,
    shutdown: Shutdown,
) -> io::Result<()> {
    Server::bind(addr, hub, shutdown).await?.run().await;
    Ok(())
}
