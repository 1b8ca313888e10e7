//! Pipeline configuration.
//!
//! [`PipelineConfig`] collects the three tunables the orchestrator honors:
//! the revision-loop budget, the per-call retry count, and the per-call
//! timeout. Construct it directly — no config-file parsing is involved.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use vignetteer::config::PipelineConfig;
//!
//! let config = PipelineConfig {
//!     max_revision_cycles: 5,
//!     ..PipelineConfig::default()
//! };
//! assert_eq!(config.generation_retries, 2);
//! assert_eq!(config.call_timeout, Duration::from_secs(120));
//! ```

use std::time::Duration;

/// Tunables for one [`Orchestrator`](crate::orchestrator::Orchestrator).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of revision requests before the run fails with
    /// `BudgetExceeded`. A run with N revisions completes only if
    /// N < `max_revision_cycles`.
    pub max_revision_cycles: usize,
    /// Extra attempts after the first for each failed agent call.
    pub generation_retries: usize,
    /// Bound on each individual provider call; a timeout counts as a
    /// generation failure and consumes a retry attempt.
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revision_cycles: 3,
            generation_retries: 2,
            call_timeout: Duration::from_secs(120),
        }
    }
}
