use folio_model::{EngineError, EntityKind};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;
pub type CollabResult<T> = Result<T, CollabError>;

/// Failures at the persistence boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Network(_) | StoreError::Io(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            StoreError::PermissionDenied(message) => EngineError::PermissionDenied(message),
            other => EngineError::Network(other.to_string()),
        }
    }
}

/// Failures of a collaboration session
#[derive(Error, Debug)]
pub enum CollabError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Collaboration bus closed")]
    BusClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_engine_taxonomy() {
        let missing = StoreError::not_found(EntityKind::Page, "p1");
        assert!(matches!(EngineError::from(missing), EngineError::NotFound { kind: EntityKind::Page, .. }));

        let io = StoreError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_transient());
        assert!(matches!(EngineError::from(io), EngineError::Network(_)));

        let denied = StoreError::PermissionDenied("read only".into());
        assert!(!denied.is_transient());
        assert!(matches!(EngineError::from(denied), EngineError::PermissionDenied(_)));
    }
}
