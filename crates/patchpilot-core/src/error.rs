//! Error types for the core crate.

use patchpilot_knowledge::KnowledgeError;
use patchpilot_protocol::CollaboratorError;
use thiserror::Error;

/// Errors returned by core operations.
#[derive(Debug, Error)]
pub enum PatchCoreError {
    /// Caller input was rejected.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Inventory or agent collaborator failed.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    /// Knowledge store failed.
    #[error("knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
