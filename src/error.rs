//! Error types for the adapter layer

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors produced while translating generic model operations into
/// external-library calls.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The requested task kind's bindings lack the required capability.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No module capability and no bare predict could serve the request.
    #[error("No available prediction function for provided model")]
    NoPredictorAvailable,

    /// A capability rejected the call convention it was invoked with.
    #[error("Signature mismatch: {0}")]
    Signature(String),

    /// The external library failed; carries its message text verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for AdapterError {
    fn from(err: polars::error::PolarsError) -> Self {
        AdapterError::Data(err.to_string())
    }
}
