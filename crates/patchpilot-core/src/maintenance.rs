//! Maintenance configurations and the patch state of the VMs assigned to them.
//!
//! Configurations are selected either by exact resource group and name, or
//! by listing the subscription and filtering. VM membership comes from each
//! VM's configuration assignments; a VM whose assignments cannot be read is
//! left out of every configuration.

use crate::context::{PatchContext, with_deadline};
use crate::error::PatchCoreError;
use futures_util::future::join_all;
use log::{debug, info, warn};
use patchpilot_protocol::{
    AvailablePatchSummary, CollaboratorError, ConfigurationAssignment, InventoryProvider,
    InventoryScope, MaintenanceConfiguration, VmInstanceView, VmInventoryEntry, VmLocator,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfigurationSchedule {
    pub start_time: Option<String>,
    pub expiration_time: Option<String>,
    pub duration: Option<String>,
    pub time_zone: Option<String>,
    pub recurrence: Option<String>,
}

/// Flattened view of a maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigurationSummary {
    pub name: String,
    pub id: String,
    pub location: Option<String>,
    pub resource_group: Option<String>,
    pub maintenance_scope: Option<String>,
    pub visibility: Option<String>,
    pub schedule: ConfigurationSchedule,
}

impl From<&MaintenanceConfiguration> for ConfigurationSummary {
    fn from(config: &MaintenanceConfiguration) -> Self {
        Self {
            name: config.name.clone(),
            id: config.id.clone(),
            location: config.location.clone(),
            resource_group: config.resource_group().map(str::to_string),
            maintenance_scope: config.maintenance_scope.clone(),
            visibility: config.visibility.clone(),
            schedule: ConfigurationSchedule {
                start_time: config.start_date_time.clone(),
                expiration_time: config.expiration_date_time.clone(),
                duration: config.duration.clone(),
                time_zone: config.time_zone.clone(),
                recurrence: config.recur_every.clone(),
            },
        }
    }
}

/// How the configuration list was narrowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfigurationSelection {
    /// Configurations listed before filtering; absent on a direct lookup.
    pub total_in_subscription: Option<usize>,
    pub requested_resource_group: Option<String>,
    pub requested_name: Option<String>,
    pub configs_after_filter: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceConfigurationDetails {
    pub subscription_id: String,
    pub configurations: Vec<ConfigurationSummary>,
    pub selection: ConfigurationSelection,
    pub total_configurations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastInstallationReport {
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub installed_patches: u32,
    pub failed_patches: u32,
    pub pending_patches: u32,
    /// Latest reboot status from installation history, or `Unknown`.
    pub reboot_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VmPatchDetails {
    pub available_patches: Option<AvailablePatchSummary>,
    pub last_installation: Option<LastInstallationReport>,
}

/// A VM assigned to a configuration. `error` is set when its status could not be read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedVm {
    pub vm_name: String,
    pub resource_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_status: Option<VmPatchDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigurationVmStatus {
    #[serde(flatten)]
    pub configuration: ConfigurationSummary,
    pub associated_vms: Vec<AssignedVm>,
    pub total_vms: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceStatusReport {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub configurations: Vec<ConfigurationVmStatus>,
    pub total_configurations: usize,
}

/// Resource-graph query for the latest reboot status of one VM.
pub fn latest_reboot_query(vm: &VmLocator) -> String {
    let resource_id = format!(
        "/subscriptions/{}/resourcegroups/{}/providers/microsoft.compute/virtualmachines/{}/",
        vm.subscription_id, vm.resource_group, vm.vm_name
    )
    .to_lowercase();
    format!(
        r#"PatchInstallationResources
| where type =~ "microsoft.compute/virtualmachines/patchinstallationresults"
| where tolower(id) startswith '{resource_id}'
| extend startTime = todatetime(properties.startDateTime), rebootStatus = tostring(properties.rebootStatus)
| project rebootStatus, startTime
| order by startTime desc
| take 1"#
    )
}

async fn select_configurations(
    inventory: &dyn InventoryProvider,
    subscription_id: &str,
    resource_group: Option<&str>,
    name: Option<&str>,
    deadline: Duration,
) -> Result<(Vec<MaintenanceConfiguration>, ConfigurationSelection), PatchCoreError> {
    let mut selection = ConfigurationSelection {
        requested_resource_group: resource_group.map(str::to_string),
        requested_name: name.map(str::to_string),
        ..ConfigurationSelection::default()
    };
    if let (Some(resource_group), Some(name)) = (resource_group, name) {
        let config = with_deadline(
            deadline,
            "maintenance configuration",
            inventory.get_maintenance_configuration(subscription_id, resource_group, name),
        )
        .await
        .map_err(|err| match err {
            CollaboratorError::NotFound(_) => CollaboratorError::NotFound(format!(
                "configuration '{name}' in resource group '{resource_group}'"
            )),
            other => other,
        })?;
        selection.configs_after_filter = 1;
        return Ok((vec![config], selection));
    }

    let all = with_deadline(
        deadline,
        "maintenance configurations",
        inventory.list_maintenance_configurations(subscription_id),
    )
    .await?;
    selection.total_in_subscription = Some(all.len());
    let selected: Vec<MaintenanceConfiguration> = all
        .into_iter()
        .filter(|config| {
            resource_group.is_none_or(|rg| {
                config
                    .resource_group()
                    .is_some_and(|own| own.eq_ignore_ascii_case(rg))
            })
        })
        .filter(|config| name.is_none_or(|name| config.name.eq_ignore_ascii_case(name)))
        .collect();
    selection.configs_after_filter = selected.len();
    debug!(
        "maintenance configurations selected (total={:?}, selected={})",
        selection.total_in_subscription, selection.configs_after_filter
    );
    Ok((selected, selection))
}

/// List maintenance configurations, narrowed by resource group and name.
pub async fn maintenance_configurations(
    inventory: &dyn InventoryProvider,
    subscription_id: &str,
    resource_group: Option<&str>,
    name: Option<&str>,
    deadline: Duration,
) -> Result<MaintenanceConfigurationDetails, PatchCoreError> {
    info!(
        "fetching maintenance configurations (subscription={}, rg={:?}, name={:?})",
        subscription_id, resource_group, name
    );
    let (configs, selection) =
        select_configurations(inventory, subscription_id, resource_group, name, deadline).await?;
    let configurations: Vec<ConfigurationSummary> =
        configs.iter().map(ConfigurationSummary::from).collect();
    Ok(MaintenanceConfigurationDetails {
        subscription_id: subscription_id.to_string(),
        total_configurations: configurations.len(),
        configurations,
        selection,
    })
}

fn power_state(view: &VmInstanceView) -> String {
    view.statuses
        .iter()
        .find(|status| {
            status
                .code
                .as_deref()
                .is_some_and(|code| code.contains("PowerState"))
        })
        .and_then(|status| status.display_status.clone())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

async fn latest_reboot_status(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    deadline: Duration,
) -> String {
    let query = latest_reboot_query(vm);
    match with_deadline(
        deadline,
        "reboot status",
        inventory.query_history(&vm.subscription_id, &query),
    )
    .await
    {
        Ok(runs) => runs
            .into_iter()
            .next()
            .and_then(|run| run.reboot_status)
            .filter(|status| !status.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        Err(err) => {
            warn!(
                "reboot status lookup failed (vm={}, error={})",
                vm.vm_name, err
            );
            UNKNOWN.to_string()
        }
    }
}

async fn assigned_vm(
    inventory: &dyn InventoryProvider,
    vm: VmLocator,
    deadline: Duration,
) -> AssignedVm {
    let view = match with_deadline(deadline, "instance view", inventory.get_vm_status(&vm)).await
    {
        Ok(view) => view,
        Err(err) => {
            return AssignedVm {
                vm_name: vm.vm_name,
                resource_group: vm.resource_group,
                power_state: None,
                patch_status: None,
                error: Some(format!("Failed to get patch status: {err}")),
            };
        }
    };
    let power_state = power_state(&view);
    let patch_status = match view.patch_status {
        Some(status) => {
            let last_installation = match status.last_patch_installation_summary {
                Some(last) => Some(LastInstallationReport {
                    status: last.status,
                    start_time: last.start_time,
                    installed_patches: last.installed_patch_count,
                    failed_patches: last.failed_patch_count,
                    pending_patches: last.pending_patch_count,
                    reboot_status: latest_reboot_status(inventory, &vm, deadline).await,
                }),
                None => None,
            };
            Some(VmPatchDetails {
                available_patches: status.available_patch_summary,
                last_installation,
            })
        }
        None => None,
    };
    AssignedVm {
        vm_name: vm.vm_name,
        resource_group: vm.resource_group,
        power_state: Some(power_state),
        patch_status,
        error: None,
    }
}

async fn assignments_of(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    deadline: Duration,
) -> Vec<ConfigurationAssignment> {
    match with_deadline(
        deadline,
        "configuration assignments",
        inventory.list_configuration_assignments(vm),
    )
    .await
    {
        Ok(assignments) => assignments,
        Err(err) => {
            debug!(
                "skipping vm without readable assignments (vm={}, error={})",
                vm.vm_name, err
            );
            Vec::new()
        }
    }
}

/// Report each selected configuration with the patch state of its assigned VMs.
pub async fn maintenance_status(
    inventory: &dyn InventoryProvider,
    subscription_id: &str,
    resource_group: Option<&str>,
    name: Option<&str>,
    deadline: Duration,
) -> Result<MaintenanceStatusReport, PatchCoreError> {
    info!(
        "fetching maintenance status (subscription={}, rg={:?}, name={:?})",
        subscription_id, resource_group, name
    );
    let (configs, _) =
        select_configurations(inventory, subscription_id, resource_group, name, deadline).await?;
    let scope = InventoryScope {
        subscription_id: subscription_id.to_string(),
        resource_group: resource_group.map(str::to_string),
        configuration_name: None,
    };
    let vms: Vec<VmInventoryEntry> = if configs.is_empty() {
        Vec::new()
    } else {
        with_deadline(deadline, "vm listing", inventory.list_vms(&scope)).await?
    };
    let locators: Vec<VmLocator> = vms
        .into_iter()
        .map(|vm| VmLocator::new(subscription_id, vm.resource_group, vm.vm_name))
        .collect();
    let assignments = join_all(
        locators
            .iter()
            .map(|vm| assignments_of(inventory, vm, deadline)),
    )
    .await;

    let members: Vec<Vec<usize>> = configs
        .iter()
        .map(|config| {
            assignments
                .iter()
                .enumerate()
                .filter(|(_, assigned)| assigned.iter().any(|a| a.targets(&config.name)))
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect();
    let mut wanted: Vec<usize> = members.iter().flatten().copied().collect();
    wanted.sort_unstable();
    wanted.dedup();
    let reports = join_all(
        wanted
            .iter()
            .map(|&idx| assigned_vm(inventory, locators[idx].clone(), deadline)),
    )
    .await;

    let configurations: Vec<ConfigurationVmStatus> = configs
        .iter()
        .zip(&members)
        .map(|(config, member_idxs)| {
            let associated_vms: Vec<AssignedVm> = member_idxs
                .iter()
                .filter_map(|idx| {
                    wanted
                        .binary_search(idx)
                        .ok()
                        .map(|pos| reports[pos].clone())
                })
                .collect();
            ConfigurationVmStatus {
                configuration: ConfigurationSummary::from(config),
                total_vms: associated_vms.len(),
                associated_vms,
            }
        })
        .collect();
    debug!(
        "maintenance status assembled (configurations={}, vms={})",
        configurations.len(),
        reports.len()
    );
    Ok(MaintenanceStatusReport {
        subscription_id: subscription_id.to_string(),
        resource_group: resource_group.map(str::to_string),
        total_configurations: configurations.len(),
        configurations,
    })
}

impl PatchContext {
    pub async fn maintenance_configurations(
        &self,
        subscription_id: &str,
        resource_group: Option<&str>,
        name: Option<&str>,
    ) -> Result<MaintenanceConfigurationDetails, PatchCoreError> {
        maintenance_configurations(
            self.inventory.as_ref(),
            subscription_id,
            resource_group,
            name,
            self.settings.probe_timeout,
        )
        .await
    }

    pub async fn maintenance_status(
        &self,
        subscription_id: &str,
        resource_group: Option<&str>,
        name: Option<&str>,
    ) -> Result<MaintenanceStatusReport, PatchCoreError> {
        maintenance_status(
            self.inventory.as_ref(),
            subscription_id,
            resource_group,
            name,
            self.settings.probe_timeout,
        )
        .await
    }
}
