//! Configuration for the [`Orchestrator`](super::Orchestrator).
//!
//! ```ignore
//! let config = OrchestratorConfig::default()
//!     .with_retention(Duration::from_secs(300))
//!     .with_cleanup_interval(Duration::from_secs(30))
//!     .with_chunk_budget(ChunkBudget::default().with_chunk_tokens(20_000));
//! ```

use std::time::Duration;

use crate::DEFAULT_REQUEST_TIMEOUT;
use crate::context::ChunkBudget;

/// How long a request record is kept after submission, whatever its status.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

/// How often the janitor sweeps expired request records.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Request records older than this are dropped by `clear_expired`.
    pub retention: Duration,
    pub cleanup_interval: Duration,
    /// Transport timeout handed to each adapter's HTTP client.
    pub request_timeout: Duration,
    pub chunk_budget: ChunkBudget,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chunk_budget: ChunkBudget::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_chunk_budget(mut self, budget: ChunkBudget) -> Self {
        self.chunk_budget = budget;
        self
    }
}
