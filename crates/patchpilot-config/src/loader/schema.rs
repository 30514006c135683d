//! Key and type checks applied to every JSON5 layer before merging.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Value kinds accepted for a leaf setting.
#[derive(Debug, Clone, Copy)]
enum Kind {
    String,
    Bool,
    Unsigned,
    OneOf(&'static [&'static str]),
}

const AGENT_KEYS: &[(&str, Kind)] = &[("endpoint", Kind::String), ("agent_id", Kind::String)];
const AZURE_KEYS: &[(&str, Kind)] = &[
    ("subscription_id", Kind::String),
    ("resource_group", Kind::String),
];
const INVENTORY_KEYS: &[(&str, Kind)] = &[("endpoint", Kind::String)];
const KNOWLEDGE_KEYS: &[(&str, Kind)] = &[
    ("enabled", Kind::Bool),
    ("backend", Kind::OneOf(&["file", "memory"])),
    ("path", Kind::String),
    ("container", Kind::String),
    ("schema_version", Kind::String),
    ("function_version", Kind::String),
];
const ORCHESTRATOR_KEYS: &[(&str, Kind)] = &[
    ("fan_out_cap", Kind::Unsigned),
    ("probe_timeout_secs", Kind::Unsigned),
];
const SERVER_KEYS: &[(&str, Kind)] = &[("bind", Kind::String)];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    for (key, value) in map {
        let fields = match key.as_str() {
            "$schema" => {
                check_kind(value, Kind::String, layer, key)?;
                continue;
            }
            "agent" => AGENT_KEYS,
            "azure" => AZURE_KEYS,
            "inventory" => INVENTORY_KEYS,
            "knowledge" => KNOWLEDGE_KEYS,
            "orchestrator" => ORCHESTRATOR_KEYS,
            "server" => SERVER_KEYS,
            _ => return Err(invalid_field(layer, key, "unknown key")),
        };
        validate_section(value, fields, layer, key)?;
    }
    Ok(())
}

fn validate_section(
    value: &Value,
    fields: &[(&str, Kind)],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    for (key, value) in map {
        let field_path = format!("{path}.{key}");
        let Some((_, kind)) = fields.iter().find(|(name, _)| name == key) else {
            return Err(invalid_field(layer, &field_path, "unknown key"));
        };
        if value.is_null() {
            continue;
        }
        check_kind(value, *kind, layer, &field_path)?;
    }
    Ok(())
}

fn check_kind(value: &Value, kind: Kind, layer: &str, path: &str) -> Result<(), ConfigError> {
    match kind {
        Kind::String if value.is_string() => Ok(()),
        Kind::String => Err(invalid_field(layer, path, "expected string")),
        Kind::Bool if value.is_boolean() => Ok(()),
        Kind::Bool => Err(invalid_field(layer, path, "expected bool")),
        Kind::Unsigned if value.is_u64() || value.as_i64().is_some_and(|n| n >= 0) => Ok(()),
        Kind::Unsigned => Err(invalid_field(layer, path, "expected non-negative integer")),
        Kind::OneOf(allowed) => match value.as_str() {
            Some(text) if allowed.contains(&text) => Ok(()),
            _ => Err(invalid_field(
                layer,
                path,
                &format!("expected one of: {}", allowed.join(", ")),
            )),
        },
    }
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
