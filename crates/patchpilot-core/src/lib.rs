//! Core patch assessment, diagnostics, and remediation planning for PatchPilot.
//!
//! This crate owns the text-fact extractor, the diagnostic aggregator, the
//! remediation planner, installation history, maintenance configuration
//! reports, and the three-phase orchestrator used by the HTTP gateway.

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod history;
pub mod maintenance;
pub mod orchestrator;
pub mod remediation;
pub mod status;

pub use context::{PatchContext, PatchSettings};
pub use diagnostics::{
    BootDiagnosticsSection, DiagnosticReport, DiagnosticSections, DiagnosticSummary,
    ExtensionSummary, ExtensionsSection, GuestAgentSection, diagnose,
};
pub use error::PatchCoreError;
pub use extract::{FailedVmMention, extract_entities, extract_failed_vms};
pub use history::{
    DEFAULT_HISTORY_DAYS, InstallationHistory, InstallationStatistics, history_query,
    installation_history,
};
pub use maintenance::{
    AssignedVm, ConfigurationSchedule, ConfigurationSelection, ConfigurationSummary,
    ConfigurationVmStatus, LastInstallationReport, MaintenanceConfigurationDetails,
    MaintenanceStatusReport, VmPatchDetails, latest_reboot_query, maintenance_configurations,
    maintenance_status,
};
pub use orchestrator::{
    OrchestrationRequest, OrchestrationResult, Orchestrator, VmDiagnosticEntry, VmOutcome,
    VmRemediationEntry, VmStatusSummary,
};
pub use remediation::{
    ActionTarget, IssueCategory, KbRecommendation, PlanSummary, Priority, RemediationAction,
    RemediationPlan, RemediationStep, RemediationSteps, extract_steps, precedent_criteria,
};
pub use status::assess_patch_status;
