//! Error types for batched optimization.
//!
//! Only conditions that abort a whole call are errors: invalid
//! configuration, inconsistent shapes, and failures reported by the
//! objective itself. Per-element outcomes such as a failed line search or a
//! non-finite gradient are not errors; they are recorded in the element's
//! status (see [`crate::optimization::optimizer::ElementStatus`]).

use thiserror::Error;

/// Errors that abort an optimization call.
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Invalid optimizer configuration.
    ///
    /// This error occurs when the optimizer is configured with invalid
    /// parameters (e.g., non-positive tolerance, zero memory size).
    #[error("Invalid optimizer configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
    },

    /// Dimension mismatch between batches or vectors.
    ///
    /// Raised during input validation, and when the objective returns values
    /// or gradients whose shape does not match the batch it was given.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// The objective reported an error while being evaluated.
    #[error("Objective evaluation failed: {reason}")]
    Objective {
        /// Description supplied by the objective
        reason: String,
    },
}

impl OptimizerError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an Objective error with a custom reason.
    pub fn objective<S: Into<String>>(reason: S) -> Self {
        Self::Objective {
            reason: reason.into(),
        }
    }
}

/// Result type alias for optimizer operations.
pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;

/// Shorter alias used by objectives and validation helpers.
pub type Result<T> = OptimizerResult<T>;
