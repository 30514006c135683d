//! Shared state for the HTTP handlers.

use crate::clients::{HttpAgentClient, HttpInventoryProvider};
use anyhow::{Context, bail};
use log::info;
use patchpilot_config::{AzureConfig, KnowledgeBackend, PatchPilotConfig};
use patchpilot_core::{Orchestrator, PatchContext};
use patchpilot_knowledge::{FileKnowledgeStore, InMemoryKnowledgeStore, KnowledgeStore};
use std::sync::Arc;

/// State handed to every handler.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Subscription and resource group applied when a request omits them.
    pub defaults: AzureConfig,
}

impl AppState {
    pub fn new(ctx: PatchContext, defaults: AzureConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(ctx),
            defaults,
        }
    }

    pub fn context(&self) -> &PatchContext {
        self.orchestrator.context()
    }

    /// Wire HTTP collaborators and the configured store from `config`.
    pub fn from_config(config: &PatchPilotConfig) -> anyhow::Result<Self> {
        let missing = config.missing_required();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }
        let (Some(agent_endpoint), Some(agent_id), Some(inventory_endpoint)) = (
            config.agent.endpoint.as_deref(),
            config.agent.agent_id.as_deref(),
            config.inventory.endpoint.as_deref(),
        ) else {
            bail!("collaborator endpoints are not configured");
        };
        let agent = HttpAgentClient::new(agent_endpoint, agent_id)
            .context("failed to build agent client")?;
        let inventory = HttpInventoryProvider::new(inventory_endpoint)
            .context("failed to build inventory client")?;

        let store: Arc<dyn KnowledgeStore> = match config.knowledge.backend {
            KnowledgeBackend::File => {
                let root = config.knowledge.store_root();
                info!("using file knowledge store (root={})", root.display());
                Arc::new(
                    FileKnowledgeStore::new(&root)
                        .with_context(|| format!("failed to open store at {}", root.display()))?,
                )
            }
            KnowledgeBackend::Memory => {
                info!("using in-memory knowledge store");
                Arc::new(InMemoryKnowledgeStore::new())
            }
        };

        let ctx = PatchContext::from_config(config, Arc::new(inventory), Arc::new(agent), store);
        Ok(Self::new(ctx, config.azure.clone()))
    }
}
