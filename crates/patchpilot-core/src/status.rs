//! Phase-1 structured patch status.

use log::{debug, info};
use patchpilot_protocol::{
    CollaboratorError, InventoryProvider, InventoryScope, PatchAssessmentRecord,
    PatchStatusSnapshot, VmInventoryEntry,
};

const UNKNOWN: &str = "unknown";

fn to_record(entry: VmInventoryEntry) -> PatchAssessmentRecord {
    let summary = entry.patch_summary.unwrap_or_default();
    PatchAssessmentRecord {
        vm_name: entry.vm_name,
        resource_group: entry.resource_group,
        power_state: entry
            .power_state
            .filter(|state| !state.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        assessment_status: summary.assessment_status,
        available_patch_count: summary.other + summary.critical_and_security,
        critical_patch_count: summary.critical_and_security,
    }
}

/// List VMs in `scope` and derive the failed subset.
pub async fn assess_patch_status(
    inventory: &dyn InventoryProvider,
    scope: &InventoryScope,
) -> Result<PatchStatusSnapshot, CollaboratorError> {
    info!(
        "assessing patch status (subscription={}, rg={:?}, config={:?})",
        scope.subscription_id, scope.resource_group, scope.configuration_name
    );
    let entries = inventory.list_vms(scope).await?;
    let records: Vec<PatchAssessmentRecord> = entries.into_iter().map(to_record).collect();
    let snapshot = PatchStatusSnapshot::from_records(
        scope.subscription_id.clone(),
        scope.resource_group.clone(),
        scope.configuration_name.clone(),
        records,
    );
    debug!(
        "patch status assessed (total={}, failed={})",
        snapshot.total_vms, snapshot.failed_count
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::assess_patch_status;
    use patchpilot_protocol::{
        AssessmentStatus, AvailablePatchSummary, InventoryScope, VmInventoryEntry,
    };
    use patchpilot_test_utils::StubInventory;
    use pretty_assertions::assert_eq;

    fn entry(name: &str, status: &str, critical: u32, other: u32) -> VmInventoryEntry {
        VmInventoryEntry {
            vm_name: name.to_string(),
            resource_group: "rg-a".to_string(),
            power_state: None,
            configuration_name: None,
            patch_summary: Some(AvailablePatchSummary {
                assessment_status: AssessmentStatus::parse(status),
                critical_and_security: critical,
                other,
                reboot_pending: false,
            }),
        }
    }

    #[tokio::test]
    async fn counts_and_failed_subset_follow_listing() {
        let inventory = StubInventory::new().with_vms(vec![
            entry("web-01", "Failed", 2, 3),
            entry("web-02", "Succeeded", 0, 1),
            VmInventoryEntry {
                vm_name: "web-03".to_string(),
                resource_group: "rg-a".to_string(),
                power_state: Some("VM running".to_string()),
                configuration_name: None,
                patch_summary: None,
            },
            entry("web-04", "FAILED", 0, 0),
        ]);
        let snapshot = assess_patch_status(
            &inventory,
            &InventoryScope {
                subscription_id: "sub".to_string(),
                ..InventoryScope::default()
            },
        )
        .await
        .expect("snapshot");
        assert_eq!(snapshot.total_vms, 4);
        assert_eq!(snapshot.failed_count, 2);
        assert_eq!(snapshot.vms[0].available_patch_count, 5);
        assert_eq!(snapshot.vms[0].critical_patch_count, 2);
        assert_eq!(snapshot.vms[0].power_state, "unknown");
        assert_eq!(snapshot.vms[2].assessment_status, AssessmentStatus::Unknown);
        assert_eq!(snapshot.failed_vms[1].vm_name, "web-04");
    }
}
