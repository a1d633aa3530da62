//! Error types for the picdrip runtime.

/// Top-level error type for the delivery service.
#[derive(Debug, thiserror::Error)]
pub enum DripError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Sent-history load or persist error.
    #[error("history error: {0}")]
    History(String),

    /// Image pool source error.
    #[error("source error: {0}")]
    Source(String),

    /// Messaging channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Scheduler error (invalid window, task state).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DripError>;
