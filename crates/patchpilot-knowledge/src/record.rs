//! Persisted record model and the path layout of the knowledge store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix under which response records are stored.
pub const RESPONSES_PREFIX: &str = "responses/";
/// Prefix under which remediation results are stored.
pub const REMEDIATIONS_PREFIX: &str = "remediations/";
/// `type` marker carried by remediation results.
pub const REMEDIATION_RESULT_TYPE: &str = "remediation_result";

/// Entities mined from a logged response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ExtractedEntities {
    pub maintenance_configs: Vec<String>,
    pub vms: Vec<String>,
    pub resource_group: Option<String>,
    pub subscription_id: Option<String>,
    pub patch_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RequestSection {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResponseSection {
    pub content: String,
    pub status: String,
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub function_version: String,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub extracted_entities: ExtractedEntities,
}

/// Search-index bookkeeping; nothing indexes records yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexingState {
    pub indexed: bool,
    pub index_version: Option<String>,
}

/// One logged query/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseRecord {
    /// Record schema version.
    pub version: String,
    /// UTC creation time.
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub request: RequestSection,
    pub response: ResponseSection,
    #[serde(default)]
    pub metadata: ResponseMetadata,
    #[serde(default)]
    pub indexing: IndexingState,
}

impl ResponseRecord {
    /// Store path derived from the record's timestamp and conversation.
    pub fn path(&self) -> String {
        response_path(self.timestamp, &self.conversation_id)
    }
}

/// Outcome of an executed remediation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    Partial,
    Failed,
}

impl RemediationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemediationOutcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "unknown remediation outcome '{other}' (expected success, partial, or failed)"
            )),
        }
    }
}

/// Persisted outcome of a remediation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemediationResultRecord {
    pub vm_name: String,
    pub resource_group: String,
    pub timestamp: DateTime<Utc>,
    /// The executed plan, stored as submitted.
    pub remediation_plan: serde_json::Value,
    pub outcome: RemediationOutcome,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(rename = "type", default = "remediation_result_type")]
    pub record_type: String,
}

fn remediation_result_type() -> String {
    REMEDIATION_RESULT_TYPE.to_string()
}

impl RemediationResultRecord {
    /// Number of actions in the stored plan.
    pub fn actions_taken(&self) -> usize {
        self.remediation_plan
            .get("remediation_actions")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// `responses/YYYY/MM/DD/<YYYYMMDD-HHMMSS-mmm>-<conversation_id>.json`
pub fn response_path(timestamp: DateTime<Utc>, conversation_id: &str) -> String {
    format!(
        "{RESPONSES_PREFIX}{}/{}-{conversation_id}.json",
        timestamp.format("%Y/%m/%d"),
        timestamp.format("%Y%m%d-%H%M%S-%3f")
    )
}

/// `remediations/YYYY/MM/DD/<vm_name>_<YYYYMMDD_HHMMSS>.json`
///
/// Path separators in `vm_name` become `_` so the object stays in the day directory.
pub fn remediation_path(vm_name: &str, timestamp: DateTime<Utc>) -> String {
    let vm_name = vm_name.replace(['/', '\\'], "_");
    format!(
        "{REMEDIATIONS_PREFIX}{}/{vm_name}_{}.json",
        timestamp.format("%Y/%m/%d"),
        timestamp.format("%Y%m%d_%H%M%S")
    )
}
