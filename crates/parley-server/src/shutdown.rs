//! Process-wide shutdown signal.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Stops the HTTP listener and bounds how long draining may take.
///
/// Open sessions are not cancelled; they end with their connections.
#[derive(Clone, Debug)]
pub struct Shutdown {
    token: CancellationToken,
    drain_timeout: Duration,
}

impl Shutdown {
    /// Create an untriggered signal.
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// A token cancelled when shutdown is triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait for `server` to finish.
    ///
    /// Returns `false` if the drain timeout elapsed and the task was aborted.
    pub async fn drain(&self, server: JoinHandle<()>) -> bool {
        self.trigger();
        let abort = server.abort_handle();
        if tokio::time::timeout(self.drain_timeout, server).await.is_ok() {
            info!("server drained");
            true
        } else {
            warn!(timeout = ?self.drain_timeout, "server drain timed out, aborting");
            abort.abort();
            false
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
