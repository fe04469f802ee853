//! RHI error types.

use thiserror::Error;

/// Errors produced by the render hardware interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    #[error("device creation failed: {0}")]
    DeviceCreationFailed(String),

    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("pipeline state is not valid: {0}")]
    InvalidPipelineState(&'static str),

    #[error("descriptor pool exhausted ({capacity} sets)")]
    DescriptorPoolExhausted { capacity: u32 },

    #[error("shader compilation failed for '{name}': {message}")]
    ShaderCompilationFailed { name: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type RhiResult<T> = Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RhiError::InvalidState {
            expected: "Ended",
            actual: "Idle",
        };
        assert_eq!(err.to_string(), "invalid state: expected Ended, found Idle");

        let err = RhiError::DescriptorPoolExhausted { capacity: 4 };
        assert_eq!(err.to_string(), "descriptor pool exhausted (4 sets)");
    }
}
