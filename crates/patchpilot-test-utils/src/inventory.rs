use async_trait::async_trait;
use parking_lot::Mutex;
use patchpilot_protocol::{
    AssessmentStatus, AvailablePatchSummary, BootDiagnosticsData, CollaboratorError,
    ConfigurationAssignment, InstallationRun, InventoryProvider, InventoryScope,
    MaintenanceConfiguration, VmInstanceView, VmInventoryEntry, VmLocator,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Listing entry with the given assessment status.
pub fn vm_entry(name: &str, resource_group: &str, status: &str) -> VmInventoryEntry {
    VmInventoryEntry {
        vm_name: name.to_string(),
        resource_group: resource_group.to_string(),
        power_state: Some("VM running".to_string()),
        configuration_name: None,
        patch_summary: Some(AvailablePatchSummary {
            assessment_status: AssessmentStatus::parse(status),
            ..AvailablePatchSummary::default()
        }),
    }
}

pub fn failed_vm(name: &str, resource_group: &str) -> VmInventoryEntry {
    vm_entry(name, resource_group, "Failed")
}

/// Maintenance configuration with a well-formed resource id.
pub fn maintenance_config(
    subscription_id: &str,
    resource_group: &str,
    name: &str,
) -> MaintenanceConfiguration {
    MaintenanceConfiguration {
        id: format!(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Maintenance/maintenanceConfigurations/{name}"
        ),
        name: name.to_string(),
        location: Some("eastus".to_string()),
        maintenance_scope: Some("InGuestPatch".to_string()),
        recur_every: Some("1Week Saturday".to_string()),
        ..MaintenanceConfiguration::default()
    }
}

/// In-memory inventory keyed by VM name.
#[derive(Clone, Default)]
pub struct StubInventory {
    vms: Vec<VmInventoryEntry>,
    views: HashMap<String, VmInstanceView>,
    boot_data: HashMap<String, BootDiagnosticsData>,
    history: Vec<InstallationRun>,
    configurations: Vec<MaintenanceConfiguration>,
    assignments: HashMap<String, Vec<ConfigurationAssignment>>,
    assignment_errors: Vec<String>,
    list_error: Option<CollaboratorError>,
    delay: Option<Duration>,
    status_calls: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StubInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vms(mut self, vms: Vec<VmInventoryEntry>) -> Self {
        self.vms = vms;
        self
    }

    pub fn with_view(mut self, vm_name: &str, view: VmInstanceView) -> Self {
        self.views.insert(vm_name.to_string(), view);
        self
    }

    pub fn with_boot_data(mut self, vm_name: &str, data: BootDiagnosticsData) -> Self {
        self.boot_data.insert(vm_name.to_string(), data);
        self
    }

    pub fn with_history(mut self, runs: Vec<InstallationRun>) -> Self {
        self.history = runs;
        self
    }

    pub fn with_configurations(
        mut self,
        configurations: Vec<MaintenanceConfiguration>,
    ) -> Self {
        self.configurations = configurations;
        self
    }

    /// Assign the configuration `configuration_id` to `vm_name`.
    pub fn with_assignment(mut self, vm_name: &str, configuration_id: &str) -> Self {
        self.assignments
            .entry(vm_name.to_string())
            .or_default()
            .push(ConfigurationAssignment {
                name: None,
                maintenance_configuration_id: configuration_id.to_string(),
            });
        self
    }

    /// Make `list_configuration_assignments` fail for `vm_name`.
    pub fn with_assignment_error(mut self, vm_name: &str) -> Self {
        self.assignment_errors.push(vm_name.to_string());
        self
    }

    /// Make `list_vms` fail with `error`.
    pub fn with_list_error(mut self, error: CollaboratorError) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Sleep before answering instance-view requests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// VM names passed to `get_vm_status`, in call order.
    pub fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl InventoryProvider for StubInventory {
    async fn list_vms(
        &self,
        scope: &InventoryScope,
    ) -> Result<Vec<VmInventoryEntry>, CollaboratorError> {
        if let Some(error) = &self.list_error {
            return Err(error.clone());
        }
        Ok(self
            .vms
            .iter()
            .filter(|vm| {
                scope
                    .resource_group
                    .as_deref()
                    .is_none_or(|rg| vm.resource_group.eq_ignore_ascii_case(rg))
            })
            .cloned()
            .collect())
    }

    async fn get_vm_status(&self, vm: &VmLocator) -> Result<VmInstanceView, CollaboratorError> {
        self.status_calls.lock().push(vm.vm_name.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.views
            .get(&vm.vm_name)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("vm {}", vm.vm_name)))
    }

    async fn boot_diagnostics_data(
        &self,
        vm: &VmLocator,
    ) -> Result<BootDiagnosticsData, CollaboratorError> {
        self.boot_data.get(&vm.vm_name).cloned().ok_or_else(|| {
            CollaboratorError::NotFound(format!("boot diagnostics for {}", vm.vm_name))
        })
    }

    async fn query_history(
        &self,
        _subscription_id: &str,
        query: &str,
    ) -> Result<Vec<InstallationRun>, CollaboratorError> {
        self.queries.lock().push(query.to_string());
        Ok(self.history.clone())
    }

    async fn list_maintenance_configurations(
        &self,
        _subscription_id: &str,
    ) -> Result<Vec<MaintenanceConfiguration>, CollaboratorError> {
        Ok(self.configurations.clone())
    }

    async fn get_maintenance_configuration(
        &self,
        _subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<MaintenanceConfiguration, CollaboratorError> {
        self.configurations
            .iter()
            .find(|config| {
                config.name.eq_ignore_ascii_case(name)
                    && config
                        .resource_group()
                        .is_some_and(|rg| rg.eq_ignore_ascii_case(resource_group))
            })
            .cloned()
            .ok_or_else(|| {
                CollaboratorError::NotFound(format!("maintenance configuration {name}"))
            })
    }

    async fn list_configuration_assignments(
        &self,
        vm: &VmLocator,
    ) -> Result<Vec<ConfigurationAssignment>, CollaboratorError> {
        if self.assignment_errors.contains(&vm.vm_name) {
            return Err(CollaboratorError::Request(format!(
                "assignments of {}",
                vm.vm_name
            )));
        }
        Ok(self.assignments.get(&vm.vm_name).cloned().unwrap_or_default())
    }
}
