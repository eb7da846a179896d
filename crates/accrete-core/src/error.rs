//! Error types for Accrete

use thiserror::Error;

/// Result type alias using Accrete's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Precondition failures, all detected before any destination element is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A buffer length does not match the problem shape
    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which buffer or dimension
        what: &'static str,
        /// Length implied by the shape
        expected: usize,
        /// Length actually supplied
        got: usize,
    },

    /// The execution plan cannot drive this problem
    #[error("Invalid plan: {reason}")]
    InvalidPlan {
        /// Why the plan was rejected
        reason: String,
    },

    /// The caller-provided workspace cannot hold this problem
    #[error("Workspace too small for {what}: need {required}, have {available}")]
    WorkspaceTooSmall {
        /// Which workspace buffer
        what: &'static str,
        /// Required number of slots
        required: usize,
        /// Number of slots available
        available: usize,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Why the argument is invalid
        reason: String,
    },
}

impl Error {
    #[inline]
    #[must_use]
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
