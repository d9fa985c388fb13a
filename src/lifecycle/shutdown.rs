//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolves on SIGTERM, SIGINT, or an explicit [`trigger`](Self::trigger)
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: CancellationToken,
}

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown from inside the daemon
    pub fn trigger(&self) {
        debug!("shutdown triggered");
        self.requested.cancel();
    }

    /// Wait for a shutdown signal
    pub async fn wait(&self) {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(?e, "failed to register signal handlers, waiting for explicit shutdown");
                self.requested.cancelled().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
            _ = self.requested.cancelled() => {
                debug!("shutdown requested");
            }
        }
    }
}
