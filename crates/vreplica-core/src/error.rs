// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for vreplica data handling
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Malformed VPod key
    #[error("Invalid VPod key: {key}")]
    #[diagnostic(
        code(vreplica::invalid_vpod_key),
        help("VPod keys have the form 'namespace/name' with both parts non-empty")
    )]
    InvalidVPodKey {
        #[allow(unused)]
        key: String,
    },

    /// Invalid VPod definition
    #[error("Invalid VPod {vpod}: {reason}")]
    #[diagnostic(
        code(vreplica::invalid_vpod),
        help("{suggestion}")
    )]
    InvalidVPod {
        #[allow(unused)]
        vpod: String,
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(vreplica::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an InvalidVPodKey error
    pub fn invalid_vpod_key(key: impl Into<String>) -> Self {
        Self::InvalidVPodKey { key: key.into() }
    }

    /// Create an InvalidVPod error
    pub fn invalid_vpod(
        vpod: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidVPod {
            vpod: vpod.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_vpod_key("no-slash");
        assert!(matches!(err, CoreError::InvalidVPodKey { .. }));
        assert_eq!(err.to_string(), "Invalid VPod key: no-slash");

        let err = CoreError::invalid_vpod(
            "ns/source",
            "negative vreplicas",
            "Set vreplicas to zero or more",
        );
        assert!(matches!(err, CoreError::InvalidVPod { .. }));
    }
}
