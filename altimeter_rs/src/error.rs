use thiserror::Error;

/// Altimeter error types
#[derive(Error, Debug)]
pub enum AltimeterError {
    /// Missing or malformed parameters detected while building a component.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single sensor payload the model cannot interpret.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Telemetry sink used out of order.
    #[error("Invalid resource state: {0}")]
    ResourceState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AltimeterError {
    /// Per-sample errors are recoverable; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AltimeterError::InvalidInput(_))
    }
}

/// Result type for altimeter operations
pub type Result<T> = std::result::Result<T, AltimeterError>;
