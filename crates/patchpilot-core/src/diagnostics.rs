//! Diagnostic aggregation over three isolated VM probes.
//!
//! Boot diagnostics, extension health, and guest-agent readiness are probed
//! concurrently. Each probe runs under its own deadline and reports failure
//! in its own `error` field, so one broken probe never hides the others.

use crate::context::{PatchContext, with_deadline};
use log::{debug, info, warn};
use patchpilot_protocol::{
    AssessmentStatus, CollaboratorError, ExtensionHandlerView, InstanceStatus, InventoryProvider,
    VmLocator,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PATCH_EXTENSION_KEYWORDS: &[&str] = &["patch", "update", "linux", "windows"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BootDiagnosticsSection {
    pub boot_diagnostics_enabled: bool,
    pub serial_console_available: bool,
    pub screenshot_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_screenshot_blob_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_console_log_blob_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vm_statuses: Vec<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One extension as seen by the diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtensionSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub extension_type: String,
    pub type_handler_version: String,
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub has_errors: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substatuses: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtensionsSection {
    pub extensions: Vec<ExtensionSummary>,
    pub patch_extension_count: usize,
    pub total_extension_count: usize,
    pub extensions_with_errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GuestAgentSection {
    pub guest_agent_installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<InstanceStatus>,
    pub agent_ready: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_handlers: Vec<ExtensionHandlerView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DiagnosticSections {
    pub boot_diagnostics: BootDiagnosticsSection,
    pub extensions: ExtensionsSection,
    pub guest_agent: GuestAgentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DiagnosticSummary {
    pub total_issues: usize,
    pub total_recommendations: usize,
    pub requires_attention: bool,
}

/// Issues and recommendations for one VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub vm_name: String,
    pub resource_group: String,
    pub assessment_status: Option<AssessmentStatus>,
    /// Absent when the report was built from the assessment alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticSections>,
    pub issues_found: Vec<String>,
    pub recommendations: Vec<String>,
    pub summary: DiagnosticSummary,
}

impl DiagnosticReport {
    /// Apply the issue and recommendation rules to probed sections.
    pub fn from_sections(
        vm_name: impl Into<String>,
        resource_group: impl Into<String>,
        assessment_status: Option<AssessmentStatus>,
        sections: DiagnosticSections,
    ) -> Self {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let boot = &sections.boot_diagnostics;
        if let Some(error) = &boot.error {
            issues.push(format!("Boot diagnostics error: {error}"));
        } else if !boot.boot_diagnostics_enabled {
            recommendations.push("Enable boot diagnostics for better troubleshooting".to_string());
        }

        let extensions = &sections.extensions;
        if extensions.extensions_with_errors > 0 {
            issues.push(format!(
                "Found {} extension(s) with errors",
                extensions.extensions_with_errors
            ));
            for extension in extensions.extensions.iter().filter(|ext| ext.has_errors) {
                issues.push(format!(
                    "Extension '{}' has errors - check statuses for details",
                    extension.name
                ));
            }
        }

        let agent = &sections.guest_agent;
        if !agent.guest_agent_installed {
            issues.push("VM Guest Agent not installed or not reporting".to_string());
            recommendations.push("Install or repair Azure VM Guest Agent".to_string());
        } else if !agent.agent_ready {
            issues.push("VM Guest Agent not in Ready state".to_string());
            recommendations.push("Check guest agent logs and restart VM if needed".to_string());
        }

        recommendations.extend(status_recommendations(assessment_status));
        Self::assemble(
            vm_name.into(),
            resource_group.into(),
            assessment_status,
            Some(sections),
            issues,
            recommendations,
        )
    }

    /// Report carrying only the status-based recommendations, no probes.
    pub fn assessment_only(
        vm_name: impl Into<String>,
        resource_group: impl Into<String>,
        assessment_status: Option<AssessmentStatus>,
    ) -> Self {
        Self::assemble(
            vm_name.into(),
            resource_group.into(),
            assessment_status,
            None,
            Vec::new(),
            status_recommendations(assessment_status),
        )
    }

    fn assemble(
        vm_name: String,
        resource_group: String,
        assessment_status: Option<AssessmentStatus>,
        diagnostics: Option<DiagnosticSections>,
        issues_found: Vec<String>,
        recommendations: Vec<String>,
    ) -> Self {
        let summary = DiagnosticSummary {
            total_issues: issues_found.len(),
            total_recommendations: recommendations.len(),
            requires_attention: !issues_found.is_empty(),
        };
        Self {
            vm_name,
            resource_group,
            assessment_status,
            diagnostics,
            issues_found,
            recommendations,
            summary,
        }
    }
}

fn status_recommendations(status: Option<AssessmentStatus>) -> Vec<String> {
    match status {
        Some(AssessmentStatus::Failed) => [
            "Review VM event logs for patch installation errors",
            "Check if VM requires reboot after previous patch installation",
            "Verify VM has adequate disk space for patch downloads",
            "Ensure VM can reach Azure Update Management endpoints",
        ]
        .iter()
        .map(|text| text.to_string())
        .collect(),
        Some(AssessmentStatus::InProgress) => {
            vec!["Assessment in progress - allow more time before troubleshooting".to_string()]
        }
        _ => Vec::new(),
    }
}

fn probe_error(vm: &VmLocator, what: &str, err: &CollaboratorError) -> String {
    match err {
        CollaboratorError::NotFound(_) => format!(
            "VM '{}' not found in resource group '{}'",
            vm.vm_name, vm.resource_group
        ),
        other => format!("Failed to get {what}: {other}"),
    }
}

/// Boot diagnostics availability and the VM's instance statuses.
pub async fn probe_boot_diagnostics(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    deadline: Duration,
) -> BootDiagnosticsSection {
    let view = match with_deadline(deadline, "instance view", inventory.get_vm_status(vm)).await {
        Ok(view) => view,
        Err(err) => {
            warn!("boot diagnostics probe failed (vm={}, error={})", vm.vm_name, err);
            return BootDiagnosticsSection {
                error: Some(probe_error(vm, "boot diagnostics", &err)),
                ..BootDiagnosticsSection::default()
            };
        }
    };
    let mut section = BootDiagnosticsSection {
        vm_statuses: view.statuses,
        ..BootDiagnosticsSection::default()
    };
    match view.boot_diagnostics {
        Some(profile) => {
            section.boot_diagnostics_enabled = profile.enabled;
            if profile.enabled {
                section.storage_uri = profile.storage_uri;
                match with_deadline(
                    deadline,
                    "boot diagnostics data",
                    inventory.boot_diagnostics_data(vm),
                )
                .await
                {
                    Ok(data) => {
                        section.serial_console_available = true;
                        section.screenshot_available = true;
                        section.console_screenshot_blob_uri = data.console_screenshot_blob_uri;
                        section.serial_console_log_blob_uri = data.serial_console_log_blob_uri;
                    }
                    Err(err) => {
                        warn!(
                            "boot diagnostics data unavailable (vm={}, error={})",
                            vm.vm_name, err
                        );
                        section.error =
                            Some(format!("Boot diagnostics enabled but data unavailable: {err}"));
                    }
                }
            }
        }
        None => {
            section.message = Some("Boot diagnostics not enabled for this VM".to_string());
        }
    }
    section
}

/// Extension statuses, with error-level entries flagged.
pub async fn probe_extensions(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    deadline: Duration,
) -> ExtensionsSection {
    let view = match with_deadline(deadline, "instance view", inventory.get_vm_status(vm)).await {
        Ok(view) => view,
        Err(err) => {
            warn!("extension probe failed (vm={}, error={})", vm.vm_name, err);
            return ExtensionsSection {
                error: Some(probe_error(vm, "extension status", &err)),
                ..ExtensionsSection::default()
            };
        }
    };
    let extensions: Vec<ExtensionSummary> = view
        .extensions
        .into_iter()
        .map(|extension| ExtensionSummary {
            has_errors: extension.statuses.iter().any(InstanceStatus::is_error),
            name: extension.name,
            extension_type: extension
                .extension_type
                .unwrap_or_else(|| "Unknown".to_string()),
            type_handler_version: extension
                .type_handler_version
                .unwrap_or_else(|| "Unknown".to_string()),
            statuses: extension.statuses,
            substatuses: extension.substatuses,
        })
        .collect();
    let patch_extension_count = extensions
        .iter()
        .filter(|extension| {
            let name = extension.name.to_lowercase();
            PATCH_EXTENSION_KEYWORDS
                .iter()
                .any(|keyword| name.contains(keyword))
        })
        .count();
    let extensions_with_errors = extensions.iter().filter(|ext| ext.has_errors).count();
    ExtensionsSection {
        patch_extension_count,
        total_extension_count: extensions.len(),
        extensions_with_errors,
        message: extensions
            .is_empty()
            .then(|| "No extensions installed on this VM".to_string()),
        extensions,
        error: None,
    }
}

/// Guest agent presence, version, and readiness.
pub async fn probe_guest_agent(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    deadline: Duration,
) -> GuestAgentSection {
    let view = match with_deadline(deadline, "instance view", inventory.get_vm_status(vm)).await {
        Ok(view) => view,
        Err(err) => {
            warn!("guest agent probe failed (vm={}, error={})", vm.vm_name, err);
            return GuestAgentSection {
                error: Some(probe_error(vm, "guest agent status", &err)),
                ..GuestAgentSection::default()
            };
        }
    };
    let Some(agent) = view.vm_agent else {
        return GuestAgentSection {
            message: Some("VM Guest Agent not installed or not reporting".to_string()),
            ..GuestAgentSection::default()
        };
    };
    let agent_ready = agent.statuses.iter().any(|status| {
        status
            .display_status
            .as_deref()
            .is_some_and(|display| display.to_lowercase().contains("ready"))
    });
    GuestAgentSection {
        guest_agent_installed: true,
        vm_agent_version: agent.vm_agent_version,
        statuses: agent.statuses,
        agent_ready,
        extension_handlers: agent.extension_handlers,
        message: None,
        error: None,
    }
}

/// Run all three probes for `vm` and build its report.
pub async fn diagnose(
    inventory: &dyn InventoryProvider,
    vm: &VmLocator,
    assessment_status: Option<AssessmentStatus>,
    deadline: Duration,
) -> DiagnosticReport {
    info!(
        "running patch failure diagnostics (subscription={}, rg={}, vm={}, status={:?})",
        vm.subscription_id, vm.resource_group, vm.vm_name, assessment_status
    );
    let (boot_diagnostics, extensions, guest_agent) = tokio::join!(
        probe_boot_diagnostics(inventory, vm, deadline),
        probe_extensions(inventory, vm, deadline),
        probe_guest_agent(inventory, vm, deadline),
    );
    let report = DiagnosticReport::from_sections(
        vm.vm_name.clone(),
        vm.resource_group.clone(),
        assessment_status,
        DiagnosticSections {
            boot_diagnostics,
            extensions,
            guest_agent,
        },
    );
    debug!(
        "diagnostics complete (vm={}, issues={}, recommendations={})",
        vm.vm_name, report.summary.total_issues, report.summary.total_recommendations
    );
    report
}

impl PatchContext {
    /// Diagnose one VM with the configured probe deadline.
    pub async fn diagnose(
        &self,
        vm: &VmLocator,
        assessment_status: Option<AssessmentStatus>,
    ) -> DiagnosticReport {
        diagnose(
            self.inventory.as_ref(),
            vm,
            assessment_status,
            self.settings.probe_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DiagnosticReport, DiagnosticSections, ExtensionSummary, ExtensionsSection,
        GuestAgentSection, diagnose,
    };
    use patchpilot_protocol::{
        AssessmentStatus, BootDiagnosticsData, BootDiagnosticsProfile, CollaboratorError,
        ExtensionView, InstanceStatus, VmAgentView, VmInstanceView, VmLocator,
    };
    use patchpilot_test_utils::StubInventory;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn status(level: &str, display: &str) -> InstanceStatus {
        InstanceStatus {
            level: Some(level.to_string()),
            display_status: Some(display.to_string()),
            ..InstanceStatus::default()
        }
    }

    fn healthy_agent() -> GuestAgentSection {
        GuestAgentSection {
            guest_agent_installed: true,
            agent_ready: true,
            ..GuestAgentSection::default()
        }
    }

    #[test]
    fn extension_errors_produce_one_issue_each() {
        let mut sections = DiagnosticSections {
            guest_agent: healthy_agent(),
            ..DiagnosticSections::default()
        };
        sections.boot_diagnostics.boot_diagnostics_enabled = true;
        sections.extensions = ExtensionsSection {
            extensions: vec![
                ExtensionSummary {
                    name: "LinuxPatchExtension".to_string(),
                    has_errors: true,
                    ..ExtensionSummary::default()
                },
                ExtensionSummary {
                    name: "Monitoring".to_string(),
                    ..ExtensionSummary::default()
                },
            ],
            extensions_with_errors: 1,
            total_extension_count: 2,
            ..ExtensionsSection::default()
        };
        let report = DiagnosticReport::from_sections("vm", "rg", None, sections);
        assert_eq!(
            report.issues_found,
            vec![
                "Found 1 extension(s) with errors".to_string(),
                "Extension 'LinuxPatchExtension' has errors - check statuses for details"
                    .to_string()
            ]
        );
        assert!(report.recommendations.is_empty());
        assert_eq!(report.summary.requires_attention, true);
    }

    #[test]
    fn clean_sections_need_no_attention() {
        let mut sections = DiagnosticSections {
            guest_agent: healthy_agent(),
            ..DiagnosticSections::default()
        };
        sections.boot_diagnostics.boot_diagnostics_enabled = true;
        let report = DiagnosticReport::from_sections(
            "vm",
            "rg",
            Some(AssessmentStatus::InProgress),
            sections,
        );
        assert!(report.issues_found.is_empty());
        assert_eq!(
            report.recommendations,
            vec!["Assessment in progress - allow more time before troubleshooting".to_string()]
        );
        assert_eq!(report.summary.requires_attention, false);
        assert_eq!(report.summary.total_recommendations, 1);
    }

    #[test]
    fn assessment_only_failed_report_recommends_generic_checks() {
        let report =
            DiagnosticReport::assessment_only("vm", "rg", Some(AssessmentStatus::Failed));
        assert_eq!(report.recommendations.len(), 4);
        assert_eq!(report.diagnostics, None);
        assert_eq!(
            report.summary.requires_attention,
            !report.issues_found.is_empty()
        );
    }

    #[tokio::test]
    async fn probes_read_instance_view() {
        let locator = VmLocator::new("sub", "rg-a", "web-01");
        let view = VmInstanceView {
            boot_diagnostics: Some(BootDiagnosticsProfile {
                enabled: true,
                storage_uri: Some("https://diag.example/".to_string()),
            }),
            statuses: vec![status("Info", "VM running")],
            extensions: vec![ExtensionView {
                name: "WindowsPatchExtension".to_string(),
                statuses: vec![status("Error", "Provisioning failed")],
                ..ExtensionView::default()
            }],
            vm_agent: Some(VmAgentView {
                vm_agent_version: Some("2.7.41491".to_string()),
                statuses: vec![status("Info", "Not Ready")],
                extension_handlers: Vec::new(),
            }),
            patch_status: None,
        };
        let inventory = StubInventory::new()
            .with_view("web-01", view)
            .with_boot_data(
                "web-01",
                BootDiagnosticsData {
                    console_screenshot_blob_uri: Some("shot".to_string()),
                    serial_console_log_blob_uri: Some("serial".to_string()),
                },
            );
        let report = diagnose(
            &inventory,
            &locator,
            Some(AssessmentStatus::Failed),
            Duration::from_secs(5),
        )
        .await;
        let sections = report.diagnostics.clone().expect("sections");
        assert_eq!(sections.boot_diagnostics.screenshot_available, true);
        assert_eq!(sections.extensions.patch_extension_count, 1);
        assert_eq!(sections.extensions.extensions[0].extension_type, "Unknown");
        // "Not Ready" still contains "ready".
        assert_eq!(sections.guest_agent.agent_ready, true);
        assert_eq!(
            report.issues_found,
            vec![
                "Found 1 extension(s) with errors".to_string(),
                "Extension 'WindowsPatchExtension' has errors - check statuses for details"
                    .to_string()
            ]
        );
        assert_eq!(report.recommendations.len(), 4);
    }

    #[tokio::test]
    async fn missing_vm_is_isolated_per_probe() {
        let locator = VmLocator::new("sub", "rg-a", "ghost");
        let inventory = StubInventory::new();
        let report = diagnose(&inventory, &locator, None, Duration::from_secs(5)).await;
        let sections = report.diagnostics.clone().expect("sections");
        let expected = Some("VM 'ghost' not found in resource group 'rg-a'".to_string());
        assert_eq!(sections.boot_diagnostics.error, expected);
        assert_eq!(sections.extensions.error, expected);
        assert_eq!(sections.guest_agent.error, expected);
        assert_eq!(
            report.issues_found,
            vec![
                "Boot diagnostics error: VM 'ghost' not found in resource group 'rg-a'"
                    .to_string(),
                "VM Guest Agent not installed or not reporting".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn slow_probe_times_out_into_error_field() {
        let locator = VmLocator::new("sub", "rg-a", "web-01");
        let inventory = StubInventory::new()
            .with_view("web-01", VmInstanceView::default())
            .with_delay(Duration::from_millis(200));
        let report = diagnose(&inventory, &locator, None, Duration::from_millis(20)).await;
        let sections = report.diagnostics.expect("sections");
        let error = sections.guest_agent.error.expect("error");
        assert!(error.starts_with("Failed to get guest agent status: timed out"));
    }

    #[tokio::test]
    async fn boot_data_failure_is_reported_as_boot_issue() {
        let locator = VmLocator::new("sub", "rg-a", "web-01");
        let inventory = StubInventory::new().with_view(
            "web-01",
            VmInstanceView {
                boot_diagnostics: Some(BootDiagnosticsProfile {
                    enabled: true,
                    storage_uri: None,
                }),
                ..VmInstanceView::default()
            },
        );
        let report = diagnose(&inventory, &locator, None, Duration::from_secs(5)).await;
        let boot = report.diagnostics.expect("sections").boot_diagnostics;
        assert_eq!(
            boot.error,
            Some(format!(
                "Boot diagnostics enabled but data unavailable: {}",
                CollaboratorError::NotFound("boot diagnostics for web-01".to_string())
            ))
        );
    }
}
