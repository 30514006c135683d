use async_trait::async_trait;
use parking_lot::Mutex;
use patchpilot_protocol::{AgentClient, AgentReply, AgentRunStatus, CollaboratorError};
use std::sync::Arc;
use std::time::Duration;

/// Agent that answers every prompt with the same text and records prompts.
#[derive(Clone)]
pub struct ScriptedAgent {
    response: String,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering each prompt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn submit(
        &self,
        thread_id: Option<&str>,
        prompt: &str,
    ) -> Result<AgentReply, CollaboratorError> {
        let count = {
            let mut prompts = self.prompts.lock();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("thread-{count}"));
        Ok(AgentReply {
            thread_id,
            status: AgentRunStatus::Completed,
            response: self.response.clone(),
        })
    }
}

/// Agent whose every call fails with a request error.
#[derive(Debug, Clone, Default)]
pub struct FailingAgent;

#[async_trait]
impl AgentClient for FailingAgent {
    async fn submit(
        &self,
        _thread_id: Option<&str>,
        _prompt: &str,
    ) -> Result<AgentReply, CollaboratorError> {
        Err(CollaboratorError::Request("agent unavailable".to_string()))
    }
}
