//! Error types for endpoint discovery.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the discovery side of the proxy.
///
/// Transient tailing failures (missing log file, rotated source, dead tail
/// process) are retried internally by the watcher and never appear here.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No endpoint announcement was observed before the deadline.
    #[error("devtools upstream not found within {waited:?}")]
    NotDiscovered {
        /// How long we waited for the first announcement.
        waited: Duration,
    },
}
