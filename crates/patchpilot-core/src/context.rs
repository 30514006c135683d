//! Explicit wiring of collaborators and settings, built once at start-up.

use patchpilot_config::PatchPilotConfig;
use patchpilot_knowledge::{KnowledgeBase, KnowledgeStore, ResponseLogSettings, ResponseLogger};
use patchpilot_protocol::{AgentClient, CollaboratorError, InventoryProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Limits applied by the orchestrator and the per-VM steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSettings {
    /// Failed VMs processed per phase.
    pub fan_out_cap: usize,
    /// Deadline for each collaborator call made by a probe or per-VM step.
    pub probe_timeout: Duration,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            fan_out_cap: 5,
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&PatchPilotConfig> for PatchSettings {
    fn from(config: &PatchPilotConfig) -> Self {
        Self {
            fan_out_cap: config.orchestrator.fan_out_cap,
            probe_timeout: Duration::from_secs(config.orchestrator.probe_timeout_secs),
        }
    }
}

/// Collaborators and settings shared by every request.
#[derive(Clone)]
pub struct PatchContext {
    pub inventory: Arc<dyn InventoryProvider>,
    pub agent: Arc<dyn AgentClient>,
    pub knowledge: KnowledgeBase,
    pub logger: ResponseLogger,
    pub settings: PatchSettings,
}

impl PatchContext {
    pub fn new(
        inventory: Arc<dyn InventoryProvider>,
        agent: Arc<dyn AgentClient>,
        store: Arc<dyn KnowledgeStore>,
        log_settings: ResponseLogSettings,
        settings: PatchSettings,
    ) -> Self {
        Self {
            inventory,
            agent,
            knowledge: KnowledgeBase::new(store.clone()),
            logger: ResponseLogger::new(store, log_settings),
            settings,
        }
    }

    /// Build a context from loaded config.
    pub fn from_config(
        config: &PatchPilotConfig,
        inventory: Arc<dyn InventoryProvider>,
        agent: Arc<dyn AgentClient>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let log_settings = ResponseLogSettings {
            enabled: config.knowledge.enabled,
            schema_version: config.knowledge.schema_version.clone(),
            function_version: config.knowledge.function_version.clone(),
        };
        Self::new(
            inventory,
            agent,
            store,
            log_settings,
            PatchSettings::from(config),
        )
    }
}

/// Run a collaborator call under `deadline`, mapping expiry to `Timeout`.
pub(crate) async fn with_deadline<T, F>(
    deadline: Duration,
    label: &str,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(format!(
            "{label} after {}s",
            deadline.as_secs_f64()
        ))),
    }
}
