//! Error types for knowledge store operations.

/// Errors returned by knowledge stores and the helpers built on them.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Create-if-absent write hit an existing object.
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    /// Requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Object path escapes the store or is malformed.
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
