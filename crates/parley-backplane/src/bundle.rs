//! The pair of backends a relay instance runs with.

use std::sync::Arc;

use crate::memory::MemoryHistory;
use crate::redis_backplane::RedisBackplane;
use crate::traits::{FanoutChannel, HistoryStore};

/// History store and fan-out channel, each optional.
#[derive(Clone, Default)]
pub struct Backplane {
    /// Where broadcasts are logged for replay; `None` disables history.
    pub history: Option<Arc<dyn HistoryStore>>,
    /// Cross-instance channel; `None` keeps rooms process-local.
    pub fanout: Option<Arc<dyn FanoutChannel>>,
}

impl Backplane {
    /// No history, no fan-out.
    pub fn none() -> Self {
        Self::default()
    }

    /// Process-local history capped at `history_limit` entries per room.
    pub fn in_memory(history_limit: usize) -> Self {
        Self {
            history: Some(Arc::new(MemoryHistory::new(history_limit))),
            fanout: None,
        }
    }

    /// Redis for both history and fan-out.
    pub fn redis(backend: RedisBackplane) -> Self {
        let backend = Arc::new(backend);
        Self {
            history: Some(backend.clone()),
            fanout: Some(backend),
        }
    }

    /// Replace the history store.
    #[must_use]
    pub fn with_history(mut self, history: Option<Arc<dyn HistoryStore>>) -> Self {
        self.history = history;
        self
    }

    /// Replace the fan-out channel.
    #[must_use]
    pub fn with_fanout(mut self, fanout: Option<Arc<dyn FanoutChannel>>) -> Self {
        self.fanout = fanout;
        self
    }
}

impl std::fmt::Debug for Backplane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backplane")
            .field("history", &self.history.is_some())
            .field("fanout", &self.fanout.is_some())
            .finish()
    }
}
