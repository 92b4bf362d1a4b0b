use thiserror::Error;

/// Why a run did not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine rejected the options")]
    InvalidOptions,

    #[error("Engine executable not found")]
    EngineNotAvailable,

    #[error("I/O failure while processing")]
    IoFailure,

    #[error("Internal engine failure")]
    InternalFailure,

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Engine returned unknown status {0}")]
    UnknownStatus(i32),

    #[error("A job is already running")]
    AlreadyRunning,
}
