//! Remediation planning from diagnostics and knowledge-base precedent.

use crate::context::PatchContext;
use crate::diagnostics::DiagnosticReport;
use crate::error::PatchCoreError;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use patchpilot_knowledge::{SearchCriteria, SearchHit, SearchResults};
use patchpilot_protocol::CollaboratorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank, lowest first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

/// Failure category recognised in knowledge-base text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    RebootRequired,
    DiskSpace,
    NetworkIssue,
    AgentIssue,
    PermissionIssue,
    PatchConflict,
}

impl IssueCategory {
    const ALL: [Self; 6] = [
        Self::RebootRequired,
        Self::DiskSpace,
        Self::NetworkIssue,
        Self::AgentIssue,
        Self::PermissionIssue,
        Self::PatchConflict,
    ];

    /// Order in which steps are emitted before sorting.
    const EMISSION_ORDER: [Self; 6] = [
        Self::RebootRequired,
        Self::DiskSpace,
        Self::AgentIssue,
        Self::NetworkIssue,
        Self::PermissionIssue,
        Self::PatchConflict,
    ];

    fn pattern(self) -> &'static str {
        match self {
            Self::RebootRequired => r"(?i)reboot|restart.*vm|pending.*reboot",
            Self::DiskSpace => r"(?i)disk.*space|storage.*full|insufficient.*space",
            Self::NetworkIssue => r"(?i)network|connectivity|endpoint|proxy",
            Self::AgentIssue => r"(?i)agent.*not.*ready|agent.*failed|extension.*error",
            Self::PermissionIssue => r"(?i)permission|unauthorized|access.*denied",
            Self::PatchConflict => r"(?i)conflict|dependency|package.*error",
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::NetworkIssue | Self::PatchConflict => Priority::Medium,
            _ => Priority::High,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::RebootRequired => "Reboot Required",
            Self::DiskSpace => "Insufficient Disk Space",
            Self::NetworkIssue => "Network Connectivity",
            Self::AgentIssue => "VM Agent Issues",
            Self::PermissionIssue => "Permission Issues",
            Self::PatchConflict => "Patch Conflicts",
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            Self::RebootRequired => "Schedule VM reboot to complete pending updates",
            Self::DiskSpace => "Free up disk space or expand disk size",
            Self::NetworkIssue => "Verify VM can reach Azure Update Management endpoints",
            Self::AgentIssue => "Check VM Guest Agent status and reinstall if necessary",
            Self::PermissionIssue => "Review and update VM managed identity permissions",
            Self::PatchConflict => "Review package dependencies and resolve conflicts",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationStep {
    pub priority: Priority,
    pub issue: String,
    pub action: String,
    pub occurrences: usize,
}

/// Categories found across a set of knowledge-base hits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemediationSteps {
    pub total_kb_results_analyzed: usize,
    pub issues_identified: BTreeMap<IssueCategory, usize>,
    pub remediation_steps: Vec<RemediationStep>,
    pub has_recommendations: bool,
}

/// Count each category at most once per hit and turn the counts into steps.
pub fn extract_steps(hits: &[SearchHit]) -> RemediationSteps {
    info!("extracting remediation steps (kb_results={})", hits.len());
    let patterns: Vec<(IssueCategory, Regex)> = IssueCategory::ALL
        .iter()
        .filter_map(|category| match Regex::new(category.pattern()) {
            Ok(regex) => Some((*category, regex)),
            Err(err) => {
                warn!(
                    "failed to compile issue pattern (category={:?}, error={})",
                    category, err
                );
                None
            }
        })
        .collect();

    let mut identified: BTreeMap<IssueCategory, usize> = BTreeMap::new();
    for hit in hits {
        let text = hit.response.to_lowercase();
        for (category, regex) in &patterns {
            if regex.is_match(&text) {
                *identified.entry(*category).or_default() += 1;
            }
        }
    }

    let mut steps: Vec<RemediationStep> = IssueCategory::EMISSION_ORDER
        .iter()
        .filter_map(|category| {
            identified.get(category).map(|count| RemediationStep {
                priority: category.priority(),
                issue: category.title().to_string(),
                action: category.action().to_string(),
                occurrences: *count,
            })
        })
        .collect();
    steps.sort_by_key(|step| (step.priority.rank(), std::cmp::Reverse(step.occurrences)));

    RemediationSteps {
        total_kb_results_analyzed: hits.len(),
        has_recommendations: !steps.is_empty(),
        issues_identified: identified,
        remediation_steps: steps,
    }
}

/// What a plan action addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ActionTarget {
    Issue { issue: String, action: String },
    Recommendation { recommendation: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationAction {
    pub step: usize,
    pub source: String,
    #[serde(flatten)]
    pub target: ActionTarget,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KbRecommendation {
    pub issue: String,
    pub action: String,
    pub priority: Priority,
    pub kb_occurrences: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanSummary {
    pub total_actions: usize,
    pub high_priority_count: usize,
    pub kb_recommendations_count: usize,
    pub estimated_resolution_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationPlan {
    pub vm_name: String,
    pub resource_group: String,
    pub timestamp: DateTime<Utc>,
    pub remediation_actions: Vec<RemediationAction>,
    pub kb_recommendations: Vec<KbRecommendation>,
    /// High-priority actions, then medium, each tier in insertion order.
    pub priority_order: Vec<RemediationAction>,
    pub summary: PlanSummary,
}

const DIAGNOSTICS_SOURCE: &str = "diagnostics";

impl RemediationPlan {
    /// Build a plan from a diagnostic report and optional knowledge-base hits.
    pub fn build(
        vm_name: &str,
        resource_group: &str,
        report: &DiagnosticReport,
        kb_results: Option<&SearchResults>,
    ) -> Self {
        info!(
            "generating remediation plan (vm={}, rg={})",
            vm_name, resource_group
        );
        let issue_count = report.issues_found.len();
        let mut actions: Vec<RemediationAction> = report
            .issues_found
            .iter()
            .enumerate()
            .map(|(idx, issue)| RemediationAction {
                step: idx + 1,
                source: DIAGNOSTICS_SOURCE.to_string(),
                target: ActionTarget::Issue {
                    issue: issue.clone(),
                    action: "Investigate and resolve".to_string(),
                },
                priority: Priority::High,
            })
            .collect();
        actions.extend(report.recommendations.iter().enumerate().map(
            |(idx, recommendation)| RemediationAction {
                step: issue_count + idx + 1,
                source: DIAGNOSTICS_SOURCE.to_string(),
                target: ActionTarget::Recommendation {
                    recommendation: recommendation.clone(),
                },
                priority: Priority::Medium,
            },
        ));

        let kb_recommendations: Vec<KbRecommendation> = match kb_results {
            Some(results) if !results.results.is_empty() => extract_steps(&results.results)
                .remediation_steps
                .into_iter()
                .map(|step| KbRecommendation {
                    issue: step.issue,
                    action: step.action,
                    priority: step.priority,
                    kb_occurrences: step.occurrences,
                })
                .collect(),
            _ => Vec::new(),
        };

        let priority_order: Vec<RemediationAction> = [Priority::High, Priority::Medium]
            .iter()
            .flat_map(|tier| actions.iter().filter(move |action| action.priority == *tier))
            .cloned()
            .collect();
        let high_priority_count = actions
            .iter()
            .filter(|action| action.priority == Priority::High)
            .count();
        let summary = PlanSummary {
            total_actions: actions.len(),
            high_priority_count,
            kb_recommendations_count: kb_recommendations.len(),
            estimated_resolution_time: format!(
                "{}-{} minutes",
                high_priority_count * 15,
                actions.len() * 10
            ),
        };

        Self {
            vm_name: vm_name.to_string(),
            resource_group: resource_group.to_string(),
            timestamp: Utc::now(),
            remediation_actions: actions,
            kb_recommendations,
            priority_order,
            summary,
        }
    }
}

/// Knowledge-base criteria used to find precedent for a failed VM.
pub fn precedent_criteria(vm_name: &str) -> SearchCriteria {
    SearchCriteria {
        assessment_status: Some("failed".to_string()),
        error_keywords: vec![vm_name.to_string()],
        ..SearchCriteria::default()
    }
}

impl PatchContext {
    /// Search for precedent, then plan against `report`.
    pub async fn plan_remediation(
        &self,
        vm_name: &str,
        resource_group: &str,
        report: &DiagnosticReport,
    ) -> Result<RemediationPlan, PatchCoreError> {
        let criteria = precedent_criteria(vm_name);
        let results =
            match tokio::time::timeout(self.settings.probe_timeout, self.knowledge.search(&criteria))
                .await
            {
                Ok(results) => results?,
                Err(_) => {
                    return Err(CollaboratorError::Timeout(format!(
                        "knowledge base search after {}s",
                        self.settings.probe_timeout.as_secs_f64()
                    ))
                    .into());
                }
            };
        debug!(
            "knowledge base precedent found (vm={}, hits={})",
            vm_name, results.total_results
        );
        Ok(RemediationPlan::build(
            vm_name,
            resource_group,
            report,
            Some(&results),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionTarget, IssueCategory, Priority, RemediationPlan, extract_steps};
    use crate::diagnostics::DiagnosticReport;
    use chrono::Utc;
    use patchpilot_knowledge::{ResponseMetadata, SearchCriteria, SearchHit, SearchResults};
    use patchpilot_protocol::AssessmentStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn hit(text: &str) -> SearchHit {
        SearchHit {
            blob_name: "responses/x.json".to_string(),
            timestamp: Utc::now(),
            query: "q".to_string(),
            response: text.to_string(),
            metadata: ResponseMetadata::default(),
            conversation_id: "c".to_string(),
        }
    }

    #[test]
    fn reboot_and_agent_text_yields_two_high_steps() {
        let steps = extract_steps(&[
            hit("VM requires reboot"),
            hit("Guest agent not ready. Extension errors"),
        ]);
        assert_eq!(steps.issues_identified.len(), 2);
        assert_eq!(
            steps.issues_identified.get(&IssueCategory::RebootRequired),
            Some(&1)
        );
        assert_eq!(steps.issues_identified.get(&IssueCategory::AgentIssue), Some(&1));
        let titles: Vec<&str> = steps
            .remediation_steps
            .iter()
            .map(|step| step.issue.as_str())
            .collect();
        assert_eq!(titles, vec!["Reboot Required", "VM Agent Issues"]);
        assert!(
            steps
                .remediation_steps
                .iter()
                .all(|step| step.priority == Priority::High)
        );
        assert_eq!(steps.has_recommendations, true);
    }

    #[test]
    fn steps_sort_by_priority_then_occurrences() {
        let steps = extract_steps(&[
            hit("network timeout"),
            hit("proxy blocked, disk space low"),
            hit("permission denied"),
            hit("unauthorized call"),
        ]);
        let order: Vec<(Priority, &str, usize)> = steps
            .remediation_steps
            .iter()
            .map(|step| (step.priority, step.issue.as_str(), step.occurrences))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::High, "Permission Issues", 2),
                (Priority::High, "Insufficient Disk Space", 1),
                (Priority::Medium, "Network Connectivity", 2),
            ]
        );
    }

    #[test]
    fn no_hits_no_recommendations() {
        let steps = extract_steps(&[]);
        assert_eq!(steps.total_kb_results_analyzed, 0);
        assert_eq!(steps.has_recommendations, false);
    }

    #[test]
    fn plan_orders_high_before_medium() {
        let mut report =
            DiagnosticReport::assessment_only("web-01", "rg-a", Some(AssessmentStatus::Failed));
        report.issues_found = vec!["disk full".to_string(), "agent down".to_string()];
        let kb = SearchResults {
            total_results: 1,
            results: vec![hit("pending reboot")],
            search_criteria: SearchCriteria::default(),
        };
        let plan = RemediationPlan::build("web-01", "rg-a", &report, Some(&kb));

        assert_eq!(plan.remediation_actions.len(), 6);
        assert_eq!(plan.remediation_actions[2].step, 3);
        assert_eq!(
            plan.remediation_actions[0].target,
            ActionTarget::Issue {
                issue: "disk full".to_string(),
                action: "Investigate and resolve".to_string()
            }
        );
        let tiers: Vec<Priority> = plan.priority_order.iter().map(|a| a.priority).collect();
        assert_eq!(
            tiers,
            vec![
                Priority::High,
                Priority::High,
                Priority::Medium,
                Priority::Medium,
                Priority::Medium,
                Priority::Medium
            ]
        );
        assert_eq!(plan.summary.high_priority_count, 2);
        assert_eq!(plan.summary.estimated_resolution_time, "30-60 minutes");
        assert_eq!(plan.kb_recommendations.len(), 1);
        assert_eq!(plan.kb_recommendations[0].issue, "Reboot Required");
    }

    #[test]
    fn recommendation_actions_serialize_without_action_field() {
        let report =
            DiagnosticReport::assessment_only("web-01", "rg-a", Some(AssessmentStatus::InProgress));
        let plan = RemediationPlan::build("web-01", "rg-a", &report, None);
        let value = serde_json::to_value(&plan.remediation_actions[0]).expect("encode");
        assert_eq!(
            value,
            json!({
                "step": 1,
                "source": "diagnostics",
                "recommendation": "Assessment in progress - allow more time before troubleshooting",
                "priority": "medium"
            })
        );
        assert_eq!(plan.summary.estimated_resolution_time, "0-10 minutes");
    }
}
