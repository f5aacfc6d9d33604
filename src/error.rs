//! Error types for the pledge engine
//!
//! Every failure the core reports: deposit validation, role checks, state
//! machine violations, index lookups, configuration loading, and internal
//! invariant breaks. All failures are synchronous and non-retryable; a
//! failed mutating call leaves state exactly as it was.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for pledge operations
#[derive(Error, Debug)]
pub enum PledgeError {
    /// Deposit validation errors
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Caller lacks the role the operation requires
    #[error("unauthorized caller {caller}: {required}")]
    Unauthorized { caller: String, required: String },

    /// Operation attempted from a status that forbids it
    #[error("invalid state for pledge {handle}: status must be {expected}, is {actual}")]
    InvalidState {
        handle: Uuid,
        expected: String,
        actual: String,
    },

    /// Referenced handle absent from the expected index or queue
    #[error("pledge {handle} not found in {index}")]
    NotFound { handle: Uuid, index: String },

    /// Account address parsing errors
    #[error("invalid account address: {0}")]
    InvalidAddress(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry invariant violations and arithmetic overflow
    #[error("internal error: {0}")]
    Internal(String),
}

impl PledgeError {
    /// Create an invalid amount error
    pub fn invalid_amount<S: Into<String>>(reason: S) -> Self {
        Self::InvalidAmount {
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(caller: impl ToString, required: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller: caller.to_string(),
            required: required.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(
        handle: Uuid,
        expected: impl Into<String>,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::InvalidState {
            handle,
            expected: expected.into(),
            actual: format!("{actual:?}"),
        }
    }

    /// Create a not found error
    pub fn not_found(handle: Uuid, index: impl Into<String>) -> Self {
        Self::NotFound {
            handle,
            index: index.into(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
