//! Conversational agent collaborator: run submission and reply types.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Completed,
    Failed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Reply from the conversational agent for one submitted prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentReply {
    /// Thread the prompt ran on (new when none was supplied).
    pub thread_id: String,
    pub status: AgentRunStatus,
    /// Last agent message text.
    pub response: String,
}

/// Conversational agent runtime consumed as "submit prompt, get text back".
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Submit a prompt, continuing `thread_id` when given.
    async fn submit(
        &self,
        thread_id: Option<&str>,
        prompt: &str,
    ) -> Result<AgentReply, CollaboratorError>;
}
