//! Three-phase orchestration: assessment, diagnostics, remediation.
//!
//! Phase 1 is fatal on collaborator failure; its agent narrative is not.
//! Phases 2 and 3 fan out over at most `fan_out_cap` failed VMs, isolate
//! per-VM failures, and keep the Phase-1 order in their results.

pub mod prompt;
mod result;

pub use result::{
    OrchestrationRequest, OrchestrationResult, VmDiagnosticEntry, VmOutcome, VmRemediationEntry,
    VmStatusSummary,
};

use crate::context::{PatchContext, with_deadline};
use crate::diagnostics::DiagnosticReport;
use crate::error::PatchCoreError;
use crate::extract::{FailedVmMention, extract_entities, extract_failed_vms};
use crate::status::assess_patch_status;
use chrono::Utc;
use futures_util::future::join_all;
use log::{debug, info, warn};
use patchpilot_knowledge::{LogOutcome, ResponseEntry};
use patchpilot_protocol::{InventoryScope, PatchAssessmentRecord, VmLocator};
use prompt::{orchestration_log_query, patch_status_prompt};
use std::time::Instant;
use uuid::Uuid;

pub const PATCH_STATUS_AGENT: &str = "Patch Status Agent";
pub const DIAGNOSTIC_AGENT: &str = "Diagnostic Agent";
pub const REMEDIATION_AGENT: &str = "Remediation Agent";
const NO_RESPONSE: &str = "No response";

/// Agent narrative gathered in Phase 1.
struct Narrative {
    thread_id: Option<String>,
    response: String,
    failed_vms: Vec<FailedVmMention>,
}

/// Drives a run against the collaborators in a [`PatchContext`].
#[derive(Clone)]
pub struct Orchestrator {
    ctx: PatchContext,
}

impl Orchestrator {
    pub fn new(ctx: PatchContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PatchContext {
        &self.ctx
    }

    /// Run all enabled phases and log the result to the knowledge store.
    pub async fn run(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<OrchestrationResult, PatchCoreError> {
        let started = Instant::now();
        if request.subscription_id.trim().is_empty() {
            return Err(PatchCoreError::Validation(
                "subscription_id must not be empty".to_string(),
            ));
        }
        info!(
            "starting orchestration (subscription={}, rg={:?}, config={:?})",
            request.subscription_id, request.resource_group, request.configuration_name
        );
        let mut result = OrchestrationResult {
            subscription_id: request.subscription_id.clone(),
            resource_group: request.resource_group.clone(),
            configuration_name: request.configuration_name.clone(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            agents_executed: Vec::new(),
            execution_flow: vec!["Phase 1: Patch Status Assessment".to_string()],
            failed_vms_detected: 0,
            failed_vms: Vec::new(),
            vm_status_summary: VmStatusSummary::default(),
            patch_status_response: NO_RESPONSE.to_string(),
            narrative_failed_vms: Vec::new(),
            diagnostic_results: None,
            remediation_plans: None,
            execution_time_ms: 0,
            execution_time: String::new(),
        };

        let scope = InventoryScope {
            subscription_id: request.subscription_id.clone(),
            resource_group: request.resource_group.clone(),
            configuration_name: request.configuration_name.clone(),
        };
        let snapshot = assess_patch_status(self.ctx.inventory.as_ref(), &scope).await?;
        result.failed_vms_detected = snapshot.failed_vms.len();
        result.vm_status_summary = VmStatusSummary {
            total_vms: snapshot.total_vms,
            failed_count: snapshot.failed_vms.len(),
            succeeded_count: snapshot.total_vms.saturating_sub(snapshot.failed_vms.len()),
        };
        result.failed_vms = snapshot.failed_vms;

        let narrative = self.patch_status_narrative(request).await;
        result.patch_status_response = narrative.response;
        result.narrative_failed_vms = narrative.failed_vms;
        result.agents_executed.push(PATCH_STATUS_AGENT.to_string());

        let targets: Vec<&PatchAssessmentRecord> = result
            .failed_vms
            .iter()
            .take(self.ctx.settings.fan_out_cap)
            .collect();

        let mut diagnostics: Option<Vec<VmDiagnosticEntry>> = None;
        if request.enable_diagnostics && !targets.is_empty() {
            info!(
                "phase 2: diagnosing failed VMs (failed={}, processed={})",
                result.failed_vms.len(),
                targets.len()
            );
            result.execution_flow.push(format!(
                "Phase 2: Diagnostics for {} failed VM(s)",
                result.failed_vms.len()
            ));
            result.agents_executed.push(DIAGNOSTIC_AGENT.to_string());
            let entries = join_all(
                targets
                    .iter()
                    .map(|vm| self.diagnostic_entry(request, vm)),
            )
            .await;
            diagnostics = Some(entries);
        }

        let mut remediation: Option<Vec<VmRemediationEntry>> = None;
        if request.enable_remediation && !targets.is_empty() {
            info!(
                "phase 3: planning remediation with knowledge base (processed={})",
                targets.len()
            );
            result
                .execution_flow
                .push("Phase 3: Remediation Planning with Knowledge Base".to_string());
            result.agents_executed.push(REMEDIATION_AGENT.to_string());
            let entries = join_all(targets.iter().enumerate().map(|(idx, vm)| {
                let prior = diagnostics
                    .as_ref()
                    .and_then(|entries| entries.get(idx))
                    .and_then(|entry| entry.outcome.completed());
                self.remediation_entry(request, vm, prior)
            }))
            .await;
            remediation = Some(entries);
        }

        result.diagnostic_results = diagnostics;
        result.remediation_plans = remediation;

        self.log_result(request, narrative.thread_id, &result, started)
            .await;

        let elapsed_ms = elapsed_millis(started);
        result.execution_time_ms = elapsed_ms;
        result.execution_time = format!("{:.2}s", elapsed_ms as f64 / 1000.0);
        info!(
            "orchestration finished (failed_vms={}, agents={}, elapsed_ms={})",
            result.failed_vms_detected,
            result.agents_executed.len(),
            elapsed_ms
        );
        Ok(result)
    }

    async fn patch_status_narrative(&self, request: &OrchestrationRequest) -> Narrative {
        let prompt = patch_status_prompt(
            &request.subscription_id,
            request.resource_group.as_deref(),
            request.configuration_name.as_deref(),
        );
        let submitted = with_deadline(
            self.ctx.settings.probe_timeout,
            "patch status narrative",
            self.ctx.agent.submit(None, &prompt),
        )
        .await;
        match submitted {
            Ok(reply) => {
                debug!(
                    "patch status narrative received (thread={}, status={})",
                    reply.thread_id, reply.status
                );
                let response = if reply.response.trim().is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    reply.response
                };
                Narrative {
                    thread_id: Some(reply.thread_id),
                    failed_vms: extract_failed_vms(&response),
                    response,
                }
            }
            Err(err) => {
                warn!("patch status narrative unavailable (error={})", err);
                Narrative {
                    thread_id: None,
                    response: NO_RESPONSE.to_string(),
                    failed_vms: Vec::new(),
                }
            }
        }
    }

    async fn diagnostic_entry(
        &self,
        request: &OrchestrationRequest,
        vm: &PatchAssessmentRecord,
    ) -> VmDiagnosticEntry {
        let resource_group = vm_resource_group(request, vm);
        let outcome = match &resource_group {
            Some(resource_group) => {
                let locator =
                    VmLocator::new(&request.subscription_id, resource_group, &vm.vm_name);
                let report = self
                    .ctx
                    .diagnose(&locator, Some(vm.assessment_status))
                    .await;
                VmOutcome::Completed { result: report }
            }
            None => {
                warn!("skipping diagnostics without resource group (vm={})", vm.vm_name);
                VmOutcome::Failed {
                    error: format!("resource group unknown for VM '{}'", vm.vm_name),
                }
            }
        };
        VmDiagnosticEntry {
            vm_name: vm.vm_name.clone(),
            resource_group: resource_group.unwrap_or_default(),
            outcome,
        }
    }

    async fn remediation_entry(
        &self,
        request: &OrchestrationRequest,
        vm: &PatchAssessmentRecord,
        prior: Option<&DiagnosticReport>,
    ) -> VmRemediationEntry {
        let resource_group = vm_resource_group(request, vm).unwrap_or_default();
        let fallback;
        let report = match prior {
            Some(report) => report,
            None => {
                fallback = DiagnosticReport::assessment_only(
                    vm.vm_name.clone(),
                    resource_group.clone(),
                    Some(vm.assessment_status),
                );
                &fallback
            }
        };
        let outcome = match self
            .ctx
            .plan_remediation(&vm.vm_name, &resource_group, report)
            .await
        {
            Ok(plan) => VmOutcome::Completed { result: plan },
            Err(err) => {
                warn!("remediation planning failed (vm={}, error={})", vm.vm_name, err);
                VmOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        VmRemediationEntry {
            vm_name: vm.vm_name.clone(),
            resource_group,
            outcome,
        }
    }

    async fn log_result(
        &self,
        request: &OrchestrationRequest,
        thread_id: Option<String>,
        result: &OrchestrationResult,
        started: Instant,
    ) {
        let content = match serde_json::to_string(result) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to encode orchestration result (error={})", err);
                return;
            }
        };
        let query = orchestration_log_query(
            &request.subscription_id,
            request.resource_group.as_deref(),
            request.configuration_name.as_deref(),
        );
        let thread = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let entry = ResponseEntry {
            extracted_entities: extract_entities(&query, &content),
            query,
            content,
            conversation_id: format!("multiagent_{thread}"),
            status: "completed".to_string(),
            execution_time_ms: Some(elapsed_millis(started)),
        };
        match self.ctx.logger.log_response(entry).await {
            Ok(LogOutcome::Logged { path }) => {
                debug!("orchestration result logged (path={})", path);
            }
            Ok(LogOutcome::Disabled) => {}
            Err(err) => warn!("failed to log orchestration result (error={})", err),
        }
    }
}

/// The VM's own resource group, else the request's.
fn vm_resource_group(request: &OrchestrationRequest, vm: &PatchAssessmentRecord) -> Option<String> {
    if vm.resource_group.is_empty() {
        request.resource_group.clone()
    } else {
        Some(vm.resource_group.clone())
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
