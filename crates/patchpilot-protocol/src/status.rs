//! Patch assessment status types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of the most recent patch scan for a VM.
///
/// Deserialization is lenient: cloud spellings such as `Failed`, `InProgress`
/// or `in_progress` are accepted case-insensitively and anything unrecognized
/// maps to [`AssessmentStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum AssessmentStatus {
    #[default]
    Unknown,
    Succeeded,
    Failed,
    InProgress,
}

impl AssessmentStatus {
    /// Parse a free-form status string.
    pub fn parse(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "failed" => Self::Failed,
            "succeeded" => Self::Succeeded,
            "inprogress" => Self::InProgress,
            _ => Self::Unknown,
        }
    }

    /// Canonical snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl From<String> for AssessmentStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for AssessmentStatus {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One VM's current patch state, produced fresh on every status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchAssessmentRecord {
    pub vm_name: String,
    pub resource_group: String,
    pub power_state: String,
    pub assessment_status: AssessmentStatus,
    pub available_patch_count: u32,
    pub critical_patch_count: u32,
}

/// Structured snapshot returned by the Phase-1 status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PatchStatusSnapshot {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub configuration_name: Option<String>,
    pub vms: Vec<PatchAssessmentRecord>,
    pub failed_vms: Vec<PatchAssessmentRecord>,
    pub total_vms: usize,
    pub failed_count: usize,
}

impl PatchStatusSnapshot {
    /// Build a snapshot, deriving the failed subset from `vms`.
    pub fn from_records(
        subscription_id: impl Into<String>,
        resource_group: Option<String>,
        configuration_name: Option<String>,
        vms: Vec<PatchAssessmentRecord>,
    ) -> Self {
        let failed_vms: Vec<PatchAssessmentRecord> = vms
            .iter()
            .filter(|vm| vm.assessment_status.is_failed())
            .cloned()
            .collect();
        Self {
            subscription_id: subscription_id.into(),
            resource_group,
            configuration_name,
            total_vms: vms.len(),
            failed_count: failed_vms.len(),
            vms,
            failed_vms,
        }
    }
}
