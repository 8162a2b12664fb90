//! Error types for xcredits.

use crate::ids::IdError;

/// Result type for xcredits operations.
pub type Result<T> = std::result::Result<T, CreditsError>;

/// Errors that can occur in xcredits operations.
///
/// Every variant carries enough structure for the HTTP layer to pick a status
/// code and for operators to locate the affected record.
#[derive(Debug, thiserror::Error)]
pub enum CreditsError {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. "order", "redeem code").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A unique key is already taken.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The conflicting key.
        id: String,
    },

    /// The entity's current state forbids the operation.
    #[error("invalid state for {entity} {id}: {state}")]
    InvalidState {
        /// Entity kind.
        entity: &'static str,
        /// The entity identifier.
        id: String,
        /// Human-readable description of the current state.
        state: String,
    },

    /// The account balance does not cover the debit.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },

    /// The redeem code is disabled, expired or exhausted.
    #[error("redeem code {code} is unusable: {reason}")]
    CodeUnusable {
        /// The code that was presented.
        code: String,
        /// Why the code cannot be used.
        reason: &'static str,
    },

    /// The entity is past its deadline.
    #[error("{entity} expired: {id}")]
    Expired {
        /// Entity kind.
        entity: &'static str,
        /// The entity identifier.
        id: String,
    },

    /// The caller does not own the entity.
    #[error("forbidden")]
    Forbidden,

    /// Request data failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The payment provider rejected or failed a request.
    #[error("payment provider error: {0}")]
    Provider(String),

    /// A payment callback failed authentication.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// A multi-step operation committed its first step but not the rest.
    #[error("partial failure during {operation} ({reference}): {message}")]
    PartialFailure {
        /// Name of the operation that partially committed.
        operation: &'static str,
        /// The identifier operators need for reconciliation.
        reference: String,
        /// The error of the step that failed.
        message: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl CreditsError {
    /// Shorthand for [`CreditsError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for [`CreditsError::InvalidState`].
    #[must_use]
    pub fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        state: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            state: state.to_string(),
        }
    }

    /// Shorthand for [`CreditsError::Expired`].
    #[must_use]
    pub fn expired(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Expired {
            entity,
            id: id.into(),
        }
    }
}
