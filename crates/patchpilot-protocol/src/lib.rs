//! Shared domain types and collaborator interfaces for PatchPilot.
//!
//! Everything the core consumes from the outside world (cloud inventory,
//! maintenance configurations, and the conversational agent) is described here
//! as typed, optional-field structs plus the traits the gateway wires concrete
//! clients into.

mod agent;
mod error;
mod inventory;
mod maintenance;
mod status;

pub use agent::{AgentClient, AgentReply, AgentRunStatus};
pub use error::CollaboratorError;
pub use inventory::{
    AvailablePatchSummary, BootDiagnosticsData, BootDiagnosticsProfile, ExtensionHandlerView,
    ExtensionView, InstallationRun, InstanceStatus, InventoryProvider, InventoryScope,
    VmAgentView, VmInstanceView, VmInventoryEntry, VmLocator, VmPatchStatusView,
};
pub use maintenance::{
    ConfigurationAssignment, LastInstallationSummary, MaintenanceConfiguration,
};
pub use status::{AssessmentStatus, PatchAssessmentRecord, PatchStatusSnapshot};
