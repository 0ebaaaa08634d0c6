//! Engine error types
//!
//! Re-exports the core error taxonomy and adds engine-level errors.

use thiserror::Error;

pub use saf_core::{ConfigError, ForwardingError, NameError};

/// Errors raised by the forwarding engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Matrix or statistics inconsistency
    #[error("Forwarding error: {0}")]
    Forwarding(#[from] ForwardingError),

    /// Malformed request name
    #[error("Name error: {0}")]
    Name(#[from] NameError),

    /// The drop sentinel is not a real face
    #[error("The drop sentinel cannot be added or removed")]
    DropSentinel,

    /// No prefix entry exists for the prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
