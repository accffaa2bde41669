//! Domain Layer - Errors
//!
//! `StoreError` is what a Store Adapter reports. `DomainError` is what the
//! core surfaces to its callers, with the failed operation and target attached.

/// Errors reported by a Store Adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("uniqueness violated: {0}")]
    Conflict(String),

    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Common result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the synchronization core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("user not logged in")]
    NotAuthenticated,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{operation} failed for {target}: {cause}")]
    StoreUnavailable {
        operation: &'static str,
        target: String,
        cause: StoreError,
    },

    #[error("migration of {count} items aborted: {cause}")]
    MigrationAborted { count: usize, cause: StoreError },

    #[error("a migration is in progress")]
    MigrationInProgress,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Attach operation context to a store failure
    pub fn from_store(operation: &'static str, target: impl Into<String>, cause: StoreError) -> Self {
        let target = target.into();
        match cause {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(_) => DomainError::NotFound(target),
            cause => DomainError::StoreUnavailable {
                operation,
                target,
                cause,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_context_is_kept() {
        let err = DomainError::from_store("update item", "42", StoreError::Unavailable("offline".to_string()));
        assert_eq!(err.to_string(), "update item failed for 42: store unreachable: offline");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err = DomainError::from_store(
            "add category",
            "Tools",
            StoreError::Conflict("category Tools exists".to_string()),
        );
        assert_eq!(err, DomainError::Conflict("category Tools exists".to_string()));
    }

    #[test]
    fn test_store_not_found_names_target() {
        let err = DomainError::from_store("delete item", "7", StoreError::NotFound("inventory/7".to_string()));
        assert_eq!(err, DomainError::NotFound("7".to_string()));
    }
}
