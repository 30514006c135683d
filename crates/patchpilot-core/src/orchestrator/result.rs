//! Shapes returned by an orchestration run.

use crate::diagnostics::DiagnosticReport;
use crate::extract::FailedVmMention;
use crate::remediation::RemediationPlan;
use patchpilot_protocol::PatchAssessmentRecord;
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// Input to a three-phase run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationRequest {
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub configuration_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enable_diagnostics: bool,
    #[serde(default = "default_enabled")]
    pub enable_remediation: bool,
}

impl OrchestrationRequest {
    /// Request with both follow-up phases enabled.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: None,
            configuration_name: None,
            enable_diagnostics: true,
            enable_remediation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VmStatusSummary {
    pub total_vms: usize,
    pub failed_count: usize,
    pub succeeded_count: usize,
}

/// Outcome of one VM's step in a fan-out phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VmOutcome<T> {
    Completed { result: T },
    Failed { error: String },
}

impl<T> VmOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmDiagnosticEntry {
    pub vm_name: String,
    pub resource_group: String,
    #[serde(flatten)]
    pub outcome: VmOutcome<DiagnosticReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmRemediationEntry {
    pub vm_name: String,
    pub resource_group: String,
    #[serde(flatten)]
    pub outcome: VmOutcome<RemediationPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationResult {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub configuration_name: Option<String>,
    /// UTC start time, `%Y-%m-%dT%H:%M:%SZ`.
    pub timestamp: String,
    pub agents_executed: Vec<String>,
    pub execution_flow: Vec<String>,
    pub failed_vms_detected: usize,
    pub failed_vms: Vec<PatchAssessmentRecord>,
    pub vm_status_summary: VmStatusSummary,
    pub patch_status_response: String,
    /// Failed VMs read from the agent's narrative. Audit only.
    #[serde(default)]
    pub narrative_failed_vms: Vec<FailedVmMention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_results: Option<Vec<VmDiagnosticEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_plans: Option<Vec<VmRemediationEntry>>,
    pub execution_time_ms: u64,
    pub execution_time: String,
}
