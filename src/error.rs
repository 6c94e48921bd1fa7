//! Error types for hchk
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in hchk
#[derive(Debug, Error)]
pub enum HchkError {
    /// The host stopped reading status reports
    #[error("Status channel closed")]
    StatusChannelClosed,

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Unit file already present
    #[error("service is already installed")]
    AlreadyInstalled,

    /// Unit file missing
    #[error("service is not installed")]
    NotInstalled,

    /// Service manager refused a start/stop request
    #[error("{0}")]
    ServiceControl(String),

    /// Text that does not name a control command
    #[error("Invalid control command: {0}")]
    InvalidCommand(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for hchk operations
pub type Result<T> = std::result::Result<T, HchkError>;
