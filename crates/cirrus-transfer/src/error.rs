//! Error types for transfer operations.

use crate::state::TransitionError;
use crate::transfer::TransferId;
use thiserror::Error;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors returned by the transfer manager.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No transfer with this id is tracked.
    #[error("transfer not found: {0}")]
    NotFound(TransferId),

    /// The requested operation is illegal in the transfer's current state.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Invalid transfer options.
    #[error("invalid transfer options: {0}")]
    InvalidOptions(String),
}

impl TransferError {
    /// Create a not found error.
    #[must_use]
    pub const fn not_found(id: TransferId) -> Self {
        Self::NotFound(id)
    }

    /// Create an invalid options error.
    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions(reason.into())
    }

    /// Returns true if the transfer does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
