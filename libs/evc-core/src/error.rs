//! Error handling for the charge controller engine
//!
//! One variant per failure class. Only `TimeoutError` is considered transient;
//! everything else indicates a dead link, a logic mismatch with the device
//! firmware, or a caller mistake.

use thiserror::Error;

use crate::orchestrator::CurrentTarget;

/// Engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvcError {
    /// Socket or connect failure
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// No response within the configured per-operation timeout
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Malformed or unexpected Modbus response
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Raw register words do not fit the register map entry
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Value or address rejected before any network call
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Device refused a write (exception response)
    #[error("Rejected: {0}")]
    RejectedError(String),

    /// Device configuration rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A multi-register write stopped half way
    #[error("Partial write: applied {applied:?}, {failed} failed: {source}")]
    PartialWrite {
        applied: Vec<CurrentTarget>,
        failed: CurrentTarget,
        source: Box<EvcError>,
    },
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, EvcError>;

impl EvcError {
    pub fn connection(msg: impl Into<String>) -> Self {
        EvcError::ConnectionError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        EvcError::TimeoutError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        EvcError::ProtocolError(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        EvcError::DecodeError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EvcError::ValidationError(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        EvcError::RejectedError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EvcError::ConfigError(msg.into())
    }

    /// Only a timeout is worth one more attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, EvcError::TimeoutError(_))
    }

    /// Connection loss aborts the whole pass instead of blanking one batch
    pub fn is_fatal_for_pass(&self) -> bool {
        matches!(self, EvcError::ConnectionError(_))
    }

    /// Short machine-readable class name, used by the HTTP layer
    pub fn kind(&self) -> &'static str {
        match self {
            EvcError::ConnectionError(_) => "connection",
            EvcError::TimeoutError(_) => "timeout",
            EvcError::ProtocolError(_) => "protocol",
            EvcError::DecodeError(_) => "decode",
            EvcError::ValidationError(_) => "validation",
            EvcError::RejectedError(_) => "rejected",
            EvcError::ConfigError(_) => "config",
            EvcError::PartialWrite { .. } => "partial_write",
        }
    }
}

impl From<std::io::Error> for EvcError {
    fn from(err: std::io::Error) -> Self {
        EvcError::ConnectionError(err.to_string())
    }
}
