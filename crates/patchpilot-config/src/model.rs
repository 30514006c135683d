//! Configuration schema for PatchPilot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root config for the PatchPilot service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PatchPilotConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl PatchPilotConfig {
    /// Names of settings the gateway cannot serve requests without.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.inventory.endpoint.as_deref().is_none_or(str::is_empty) {
            missing.push("inventory.endpoint");
        }
        if self.agent.endpoint.as_deref().is_none_or(str::is_empty) {
            missing.push("agent.endpoint");
        }
        if self.agent.agent_id.as_deref().is_none_or(str::is_empty) {
            missing.push("agent.agent_id");
        }
        missing
    }
}

/// Conversational agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base URL of the agent project endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Agent to run prompts against.
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Default cloud scope applied to queries.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AzureConfig {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
}

/// Inventory API gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InventoryConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Storage backend used for the knowledge base.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeBackend {
    #[default]
    File,
    Memory,
}

/// Knowledge base and response logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeConfig {
    /// Log responses to the knowledge base.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: KnowledgeBackend,
    /// Root directory for the file backend.
    #[serde(default = "default_knowledge_path")]
    pub path: PathBuf,
    /// Container name, used as a subdirectory of `path`.
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_function_version")]
    pub function_version: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: KnowledgeBackend::default(),
            path: default_knowledge_path(),
            container: default_container(),
            schema_version: default_schema_version(),
            function_version: default_function_version(),
        }
    }
}

impl KnowledgeConfig {
    /// Directory holding the file-backed store.
    pub fn store_root(&self) -> PathBuf {
        self.path.join(&self.container)
    }
}

fn default_true() -> bool {
    true
}

fn default_knowledge_path() -> PathBuf {
    PathBuf::from("knowledge")
}

fn default_container() -> String {
    "agent-knowledge-workspace-postpatch".to_string()
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_function_version() -> String {
    "1.0.0".to_string()
}

/// Multi-agent orchestration limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Failed VMs processed per phase.
    #[serde(default = "default_fan_out_cap")]
    pub fan_out_cap: usize,
    /// Deadline for each collaborator call made while diagnosing or planning.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fan_out_cap: default_fan_out_cap(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_fan_out_cap() -> usize {
    5
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7071".to_string()
}
