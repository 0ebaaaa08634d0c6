//! Error types for the SAF forwarding engine

use thiserror::Error;

use crate::face::{FaceId, Layer};

/// Top-level error type
#[derive(Debug, Error)]
pub enum SafError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Forwarding error: {0}")]
    Forwarding(#[from] ForwardingError),

    #[error("Name error: {0}")]
    Name(#[from] NameError),
}

/// Invalid engine configuration, detected at construction
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Reliability threshold bounds inverted: min {min} > max {max}")]
    InvertedThresholds { min: f64, max: f64 },

    #[error("Parameter {name} out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("Capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
}

/// Errors raised by matrix and statistics operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForwardingError {
    /// A face was referenced that was never added to the engine
    #[error("Unknown face: {0}")]
    UnknownFace(FaceId),

    /// A tried face passed to face selection is absent from the matrix
    #[error("Tried face {0} is not present in the forwarding matrix")]
    TriedFaceMissing(FaceId),

    #[error("Layer {layer} out of range (max {max})")]
    UnknownLayer { layer: Layer, max: usize },
}

/// Errors related to request names
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid name URI: {0:?}")]
    InvalidUri(String),
}

/// Result type alias for SAF operations
pub type SafResult<T> = Result<T, SafError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvertedThresholds { min: 0.9, max: 0.5 };
        let msg = format!("{}", err);
        assert!(msg.contains("0.9"));
        assert!(msg.contains("0.5"));

        let err = ConfigError::UnknownParameter("GAMMA_X".to_string());
        assert!(format!("{}", err).contains("GAMMA_X"));
    }

    #[test]
    fn test_forwarding_error_display() {
        let face = FaceId::new(3).unwrap();
        assert!(format!("{}", ForwardingError::UnknownFace(face)).contains("face#3"));
        assert!(
            format!("{}", ForwardingError::TriedFaceMissing(face)).contains("not present")
        );
    }

    #[test]
    fn test_error_conversions() {
        let err: SafError = ConfigError::NonPositiveCapacity(0.0).into();
        assert!(matches!(err, SafError::Config(_)));

        let err: SafError = ForwardingError::UnknownFace(FaceId::DROP).into();
        assert!(matches!(err, SafError::Forwarding(_)));

        let err: SafError = NameError::InvalidUri("x".to_string()).into();
        assert!(format!("{}", err).contains("Name error"));
    }
}
