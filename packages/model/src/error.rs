use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// What kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Page,
    Block,
    Database,
    Property,
    Row,
    View,
    Comment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Page => "page",
            EntityKind::Block => "block",
            EntityKind::Database => "database",
            EntityKind::Property => "property",
            EntityKind::Row => "row",
            EntityKind::View => "view",
            EntityKind::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// Errors raised by local document operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn duplicate(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::DuplicateId {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }
}
