//! Errors shared by every collaborator client.

/// Errors returned by external collaborators (inventory, agent runtime).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The collaborator call failed.
    #[error("request failed: {0}")]
    Request(String),
    /// The collaborator answered with a payload we could not decode.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The call did not complete within its deadline.
    #[error("timed out: {0}")]
    Timeout(String),
}
