//! Error types for xcredits storage.

use xcredits_core::CreditsError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// The key that was looked up.
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

    /// A conditional update found a different current value.
    #[error("conflicting update on {entity}: {id}")]
    Conflict {
        /// Entity kind.
        entity: &'static str,
        /// The key whose current value did not match.
        id: String,
    },
}

impl StoreError {
    /// A rejected conditional write on `entity` at `id`.
    pub(crate) fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        let id = id.into();
        tracing::debug!(entity, id = %id, "Conditional write rejected");
        Self::Conflict { entity, id }
    }
}

impl From<StoreError> for CreditsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::AlreadyExists { entity, id } => Self::AlreadyExists { entity, id },
            StoreError::Conflict { entity, id } => Self::Storage(format!(
                "unresolved conflicting update on {entity} {id}"
            )),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_keeps_entity_and_surfaces_as_storage() {
        let err = StoreError::conflict("redeem_code", "GIFT-1");
        assert!(matches!(
            &err,
            StoreError::Conflict { entity: "redeem_code", id } if id == "GIFT-1"
        ));
        assert!(matches!(CreditsError::from(err), CreditsError::Storage(_)));
    }
}
