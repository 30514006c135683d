//! Patch installation history over the inventory's resource-graph query.

use crate::context::{PatchContext, with_deadline};
use crate::error::PatchCoreError;
use log::info;
use patchpilot_protocol::{InstallationRun, InventoryProvider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Runs kept in a history response.
const MAX_RUNS: usize = 50;
pub const DEFAULT_HISTORY_DAYS: u32 = 30;
const UNKNOWN: &str = "Unknown";

/// SQL VMs and Arc SQL instances keep their SQL resource type through the join.
const HISTORY_SOURCE: &str = r#"PatchInstallationResources
| where properties.lastModifiedDateTime > ago({days}d)
| where type in~ ("microsoft.compute/virtualmachines/patchinstallationresults", "microsoft.hybridcompute/machines/patchinstallationresults")
| parse tolower(id) with resourceId "/patchinstallationresults" *
| extend resourceId=tolower(resourceId), resourceType = strcat(split(type, "/")[0], "/", split(type, "/")[1])
| join kind=leftouter(
    resources
    | where type in~ ("Microsoft.SqlVirtualMachine/sqlVirtualMachines", "microsoft.azurearcdata/sqlserverinstances")
    | project resourceId = iff(type =~ "Microsoft.SqlVirtualMachine/sqlVirtualMachines", tolower(properties.virtualMachineResourceId), tolower(properties.containerResourceId)), sqlType = type
    | summarize by resourceId, sqlType
) on resourceId
| extend resourceType = iff(isnotempty(sqlType), sqlType, resourceType)
| project id, type, properties, resourceType, resourceId
| where resourceType in~ ("microsoft.compute/virtualmachines", "microsoft.hybridcompute/machines", "microsoft.sqlvirtualmachine/sqlvirtualmachines", "microsoft.azurearcdata/sqlserverinstances")"#;

const HISTORY_PROJECTION: &str = r#"| extend
    vmName = tostring(split(resourceId, '/')[8]),
    resourceGroupName = tostring(split(resourceId, '/')[4]),
    osType = tostring(properties.osType),
    startedBy = tostring(properties.startedBy),
    status = tostring(properties.status),
    maintenanceRunId = tostring(properties.maintenanceRunId),
    isAutoPatching = isempty(properties.maintenanceRunId),
    startTime = todatetime(properties.startDateTime),
    endTime = todatetime(properties.lastModifiedDateTime),
    installedPatchCount = toint(properties.installedPatchCount),
    failedPatchCount = toint(properties.failedPatchCount),
    pendingPatchCount = toint(properties.pendingPatchCount),
    excludedPatchCount = toint(properties.excludedPatchCount),
    notSelectedPatchCount = toint(properties.notSelectedPatchCount),
    rebootStatus = tostring(properties.rebootStatus)
| project vmName, resourceGroupName, osType, startedBy, status, maintenanceRunId, isAutoPatching,
          startTime, endTime, installedPatchCount, failedPatchCount, pendingPatchCount,
          excludedPatchCount, notSelectedPatchCount, rebootStatus, resourceType
| order by startTime desc"#;

/// Resource-graph query for installation runs in the last `days`.
pub fn history_query(days: u32, resource_group: Option<&str>) -> String {
    let mut query = HISTORY_SOURCE.replace("{days}", &days.to_string());
    if let Some(resource_group) = resource_group {
        query.push_str(&format!(
            "\n| where resourceId contains '{}'",
            resource_group.to_lowercase()
        ));
    }
    query.push('\n');
    query.push_str(HISTORY_PROJECTION);
    query
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstallationStatistics {
    pub total_installations: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_os: BTreeMap<String, usize>,
    pub by_starter: BTreeMap<String, usize>,
    pub maintenance_runs: usize,
    pub auto_patching_runs: usize,
}

impl InstallationStatistics {
    pub fn from_runs(runs: &[InstallationRun]) -> Self {
        let mut stats = Self {
            total_installations: runs.len(),
            ..Self::default()
        };
        let label = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());
        for run in runs {
            *stats.by_status.entry(label(&run.status)).or_default() += 1;
            *stats.by_os.entry(label(&run.os_type)).or_default() += 1;
            *stats.by_starter.entry(label(&run.started_by)).or_default() += 1;
            if run.is_auto_patching {
                stats.auto_patching_runs += 1;
            } else {
                stats.maintenance_runs += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationHistory {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub days_of_history: u32,
    pub statistics: InstallationStatistics,
    /// Most recent runs first, at most 50.
    pub installations: Vec<InstallationRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Fetch installation runs and summarize them.
pub async fn installation_history(
    inventory: &dyn InventoryProvider,
    subscription_id: &str,
    days: u32,
    resource_group: Option<&str>,
    deadline: Duration,
) -> Result<InstallationHistory, PatchCoreError> {
    info!(
        "fetching patch installation history (subscription={}, days={}, rg={:?})",
        subscription_id, days, resource_group
    );
    let query = history_query(days, resource_group);
    let mut runs = with_deadline(
        deadline,
        "installation history",
        inventory.query_history(subscription_id, &query),
    )
    .await?;
    let statistics = InstallationStatistics::from_runs(&runs);
    let note = (runs.len() > MAX_RUNS).then(|| {
        format!(
            "Showing {MAX_RUNS} most recent installations out of {} total",
            runs.len()
        )
    });
    runs.truncate(MAX_RUNS);
    Ok(InstallationHistory {
        subscription_id: subscription_id.to_string(),
        resource_group: resource_group.map(str::to_string),
        days_of_history: days,
        statistics,
        installations: runs,
        note,
    })
}

impl PatchContext {
    pub async fn installation_history(
        &self,
        subscription_id: &str,
        days: u32,
        resource_group: Option<&str>,
    ) -> Result<InstallationHistory, PatchCoreError> {
        installation_history(
            self.inventory.as_ref(),
            subscription_id,
            days,
            resource_group,
            self.settings.probe_timeout,
        )
        .await
    }
}
