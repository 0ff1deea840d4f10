//! Error types for idlescope

use std::io;
use thiserror::Error;

/// Result type alias for idlescope operations
pub type Result<T> = std::result::Result<T, IdleError>;

/// Main error type for trace analysis
#[derive(Error, Debug)]
pub enum IdleError {
    /// An event referenced a CPU that is not part of the topology
    #[error("CPU {0} is not part of the topology")]
    UnknownCpu(u32),

    /// An idle event carried a depth beyond the supported C-state range
    #[error("C-state depth {depth} on CPU {cpu} is out of range")]
    UnknownDepth {
        /// CPU the event was recorded on
        cpu: u32,
        /// Requested depth
        depth: usize,
    },

    /// A statistics table could not grow
    #[error("Allocation failure: {0}")]
    Allocation(String),

    /// Topology declares a group without members, or a duplicated CPU
    #[error("Malformed topology: {0}")]
    MalformedTopology(String),

    /// Baseline tree does not line up with the current run
    #[error("Inconsistent baseline: {0}")]
    InconsistentBaseline(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No trace adapter registered under this name
    #[error("Unknown trace format: {0}")]
    UnknownAdapter(String),

    /// No report registered under this name
    #[error("Unknown report format: {0}")]
    UnknownReport(String),

    /// No registered adapter recognised the trace file
    #[error("Unrecognized trace file: {0}")]
    UnrecognizedTrace(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl IdleError {
    /// Whether the replay can drop the offending event and carry on.
    ///
    /// Only structural input errors are recoverable; everything else
    /// would leave cumulative statistics silently incomplete.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IdleError::UnknownCpu(_) | IdleError::UnknownDepth { .. })
    }
}

impl From<std::collections::TryReserveError> for IdleError {
    fn from(err: std::collections::TryReserveError) -> Self {
        IdleError::Allocation(err.to_string())
    }
}
