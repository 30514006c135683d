//! Cloud inventory collaborator: VM listings, instance views, and history rows.
//!
//! Every inbound shape is an explicit struct whose optional fields default on
//! decode, so downstream code never has to probe for presence.

use crate::error::CollaboratorError;
use crate::maintenance::{
    ConfigurationAssignment, LastInstallationSummary, MaintenanceConfiguration,
};
use crate::status::AssessmentStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope of a VM listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InventoryScope {
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub configuration_name: Option<String>,
}

/// Address of a single VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmLocator {
    pub subscription_id: String,
    pub resource_group: String,
    pub vm_name: String,
}

impl VmLocator {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        vm_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            vm_name: vm_name.into(),
        }
    }
}

/// A VM returned by a scoped listing, with its patch summary if reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmInventoryEntry {
    pub vm_name: String,
    pub resource_group: String,
    #[serde(default)]
    pub power_state: Option<String>,
    #[serde(default)]
    pub configuration_name: Option<String>,
    #[serde(default)]
    pub patch_summary: Option<AvailablePatchSummary>,
}

/// Available-patch summary from the last assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AvailablePatchSummary {
    #[serde(default)]
    pub assessment_status: AssessmentStatus,
    #[serde(default)]
    pub critical_and_security: u32,
    #[serde(default)]
    pub other: u32,
    #[serde(default)]
    pub reboot_pending: bool,
}

/// Generic status entry reported by the VM, an extension, or the guest agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstanceStatus {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub display_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl InstanceStatus {
    /// True when the status level is `Error` (case-insensitive).
    pub fn is_error(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("error"))
    }
}

/// Boot diagnostics settings from the VM profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BootDiagnosticsProfile {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub storage_uri: Option<String>,
}

/// Blob locations of the boot screenshot and serial log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BootDiagnosticsData {
    #[serde(default)]
    pub console_screenshot_blob_uri: Option<String>,
    #[serde(default)]
    pub serial_console_log_blob_uri: Option<String>,
}

/// Extension entry from the instance view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtensionView {
    pub name: String,
    #[serde(default, rename = "type")]
    pub extension_type: Option<String>,
    #[serde(default)]
    pub type_handler_version: Option<String>,
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub substatuses: Vec<InstanceStatus>,
}

/// Extension handler reported by the guest agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtensionHandlerView {
    #[serde(default, rename = "type")]
    pub handler_type: Option<String>,
    #[serde(default)]
    pub type_handler_version: Option<String>,
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

/// Guest agent section of the instance view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VmAgentView {
    #[serde(default)]
    pub vm_agent_version: Option<String>,
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub extension_handlers: Vec<ExtensionHandlerView>,
}

/// Patch section of the instance view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VmPatchStatusView {
    #[serde(default)]
    pub available_patch_summary: Option<AvailablePatchSummary>,
    #[serde(default)]
    pub last_patch_installation_summary: Option<LastInstallationSummary>,
}

/// Instance view of a VM, as far as diagnostics and maintenance reports need it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VmInstanceView {
    #[serde(default)]
    pub boot_diagnostics: Option<BootDiagnosticsProfile>,
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub extensions: Vec<ExtensionView>,
    #[serde(default)]
    pub vm_agent: Option<VmAgentView>,
    #[serde(default)]
    pub patch_status: Option<VmPatchStatusView>,
}

/// One patch installation run returned by a history query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRun {
    #[serde(default)]
    pub vm_name: String,
    #[serde(default)]
    pub resource_group_name: String,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub started_by: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub maintenance_run_id: Option<String>,
    #[serde(default)]
    pub is_auto_patching: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installed_patch_count: u32,
    #[serde(default)]
    pub failed_patch_count: u32,
    #[serde(default)]
    pub pending_patch_count: u32,
    #[serde(default)]
    pub excluded_patch_count: u32,
    #[serde(default)]
    pub not_selected_patch_count: u32,
    #[serde(default)]
    pub reboot_status: Option<String>,
    /// Compute or hybrid machine type, or the SQL type when the VM hosts SQL.
    #[serde(default)]
    pub resource_type: Option<String>,
}

/// Read-only access to the cloud compute, maintenance, and resource-graph APIs.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// List VMs in scope together with their patch summary.
    async fn list_vms(
        &self,
        scope: &InventoryScope,
    ) -> Result<Vec<VmInventoryEntry>, CollaboratorError>;

    /// Fetch the instance view of a single VM.
    async fn get_vm_status(&self, vm: &VmLocator) -> Result<VmInstanceView, CollaboratorError>;

    /// Retrieve boot diagnostics blob locations for a VM.
    async fn boot_diagnostics_data(
        &self,
        vm: &VmLocator,
    ) -> Result<BootDiagnosticsData, CollaboratorError>;

    /// Run a resource-graph style query and return installation rows.
    async fn query_history(
        &self,
        subscription_id: &str,
        query: &str,
    ) -> Result<Vec<InstallationRun>, CollaboratorError>;

    /// List every maintenance configuration in a subscription.
    async fn list_maintenance_configurations(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<MaintenanceConfiguration>, CollaboratorError>;

    /// Fetch one maintenance configuration by resource group and name.
    async fn get_maintenance_configuration(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<MaintenanceConfiguration, CollaboratorError>;

    /// List the maintenance configurations assigned to a VM.
    async fn list_configuration_assignments(
        &self,
        vm: &VmLocator,
    ) -> Result<Vec<ConfigurationAssignment>, CollaboratorError>;
}
