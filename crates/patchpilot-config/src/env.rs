//! Environment variable overrides applied on top of the layered config.

use crate::{ConfigError, PatchPilotConfig};
use log::debug;
use std::path::PathBuf;

impl PatchPilotConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs. Unrelated names are ignored.
    ///
    /// The cloud-native names (`AZURE_SUBSCRIPTION_ID`, `PROJECT_ENDPOINT`,
    /// `AGENT_ID`, ...) are accepted alongside the `PATCHPILOT_*` ones.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let name = name.as_ref();
            let value: String = value.into();
            match name {
                "AZURE_SUBSCRIPTION_ID" | "PATCHPILOT_SUBSCRIPTION_ID" => {
                    self.azure.subscription_id = non_empty(value);
                }
                "AZURE_RESOURCE_GROUP" | "PATCHPILOT_RESOURCE_GROUP" => {
                    self.azure.resource_group = non_empty(value);
                }
                "PROJECT_ENDPOINT" | "PATCHPILOT_AGENT_ENDPOINT" => {
                    self.agent.endpoint = non_empty(value);
                }
                "AGENT_ID" | "PATCHPILOT_AGENT_ID" => {
                    self.agent.agent_id = non_empty(value);
                }
                "PATCHPILOT_INVENTORY_ENDPOINT" => {
                    self.inventory.endpoint = non_empty(value);
                }
                "ENABLE_RESPONSE_LOGGING" | "PATCHPILOT_KNOWLEDGE_ENABLED" => {
                    self.knowledge.enabled = value.trim().eq_ignore_ascii_case("true");
                }
                "KNOWLEDGE_BASE_CONTAINER" | "PATCHPILOT_KNOWLEDGE_CONTAINER" => {
                    self.knowledge.container = value;
                }
                "PATCHPILOT_KNOWLEDGE_PATH" => {
                    self.knowledge.path = PathBuf::from(value);
                }
                "LOG_SCHEMA_VERSION" => {
                    self.knowledge.schema_version = value;
                }
                "PATCHPILOT_FAN_OUT_CAP" => {
                    self.orchestrator.fan_out_cap = parse_number(name, &value)?;
                }
                "PATCHPILOT_PROBE_TIMEOUT_SECS" => {
                    self.orchestrator.probe_timeout_secs = parse_number(name, &value)?;
                }
                "PATCHPILOT_BIND" => {
                    self.server.bind = value;
                }
                _ => continue,
            }
            debug!("applied env override (name={})", name);
        }
        self.validate()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidField {
            path: format!("env:{name}"),
            message: format!("expected non-negative integer, got '{value}'"),
        })
}
