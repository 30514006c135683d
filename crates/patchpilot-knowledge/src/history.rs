//! Remediation result persistence and history queries.

use crate::error::KnowledgeError;
use crate::record::{
    REMEDIATION_RESULT_TYPE, REMEDIATIONS_PREFIX, RemediationOutcome, RemediationResultRecord,
    remediation_path,
};
use crate::store::{KnowledgeBase, PutOptions};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Acknowledgement of a saved remediation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedResult {
    pub saved: bool,
    pub blob_path: String,
    pub timestamp: DateTime<Utc>,
}

fn default_days() -> u32 {
    30
}

fn default_history_max_results() -> usize {
    20
}

/// Filters for a history query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryCriteria {
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_history_max_results")]
    pub max_results: usize,
}

impl Default for HistoryCriteria {
    fn default() -> Self {
        Self {
            vm_name: None,
            resource_group: None,
            days: default_days(),
            max_results: default_history_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub blob_name: String,
    pub vm_name: String,
    pub resource_group: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: RemediationOutcome,
    pub notes: Option<String>,
    pub actions_taken: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryStatistics {
    /// Percentage of successful outcomes, one decimal, e.g. `"66.7%"`.
    pub success_rate: String,
    pub total_remediations: usize,
    pub days_analyzed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationHistory {
    pub total_results: usize,
    pub results: Vec<HistoryEntry>,
    pub statistics: HistoryStatistics,
}

/// Format the share of successful entries as a percentage string.
pub fn success_rate(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "0.0%".to_string();
    }
    let successes = entries
        .iter()
        .filter(|entry| entry.outcome == RemediationOutcome::Success)
        .count();
    format!("{:.1}%", successes as f64 / entries.len() as f64 * 100.0)
}

fn same_name(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right)
}

impl KnowledgeBase {
    /// Persist a remediation outcome. Existing results at the same path are replaced.
    pub async fn save_result(
        &self,
        vm_name: &str,
        resource_group: &str,
        remediation_plan: serde_json::Value,
        outcome: RemediationOutcome,
        notes: Option<String>,
    ) -> Result<SavedResult, KnowledgeError> {
        self.save_result_at(
            vm_name,
            resource_group,
            remediation_plan,
            outcome,
            notes,
            Utc::now(),
        )
        .await
    }

    /// Save stamped with an explicit `timestamp`, which also picks the path.
    pub async fn save_result_at(
        &self,
        vm_name: &str,
        resource_group: &str,
        remediation_plan: serde_json::Value,
        outcome: RemediationOutcome,
        notes: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<SavedResult, KnowledgeError> {
        if vm_name.trim().is_empty() {
            return Err(KnowledgeError::Invalid("vm_name must not be empty".to_string()));
        }
        let record = RemediationResultRecord {
            vm_name: vm_name.to_string(),
            resource_group: resource_group.to_string(),
            timestamp,
            remediation_plan,
            outcome,
            notes,
            record_type: REMEDIATION_RESULT_TYPE.to_string(),
        };
        let blob_path = remediation_path(vm_name, timestamp);
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store()
            .put(&blob_path, bytes, PutOptions::overwrite())
            .await?;
        info!(
            "saved remediation result (path={}, vm={}, outcome={})",
            blob_path, vm_name, outcome
        );
        Ok(SavedResult {
            saved: true,
            blob_path,
            timestamp,
        })
    }

    /// Remediation results within the last `days`, newest first.
    pub async fn history(
        &self,
        criteria: &HistoryCriteria,
    ) -> Result<RemediationHistory, KnowledgeError> {
        self.history_at(criteria, Utc::now()).await
    }

    /// History relative to an explicit `now`.
    pub async fn history_at(
        &self,
        criteria: &HistoryCriteria,
        now: DateTime<Utc>,
    ) -> Result<RemediationHistory, KnowledgeError> {
        info!(
            "loading remediation history (vm={:?}, rg={:?}, days={})",
            criteria.vm_name, criteria.resource_group, criteria.days
        );
        let cutoff = now - Duration::days(i64::from(criteria.days));
        let mut results = Vec::new();
        for object in self.store().list_by_prefix(REMEDIATIONS_PREFIX).await? {
            if object.last_modified < cutoff {
                continue;
            }
            let bytes = match self.store().get(&object.path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("skipping unreadable remediation (path={}, error={})", object.path, err);
                    continue;
                }
            };
            let record: RemediationResultRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    warn!("skipping malformed remediation (path={}, error={})", object.path, err);
                    continue;
                }
            };
            if let Some(vm_name) = &criteria.vm_name
                && !same_name(&record.vm_name, vm_name)
            {
                continue;
            }
            if let Some(resource_group) = &criteria.resource_group
                && !same_name(&record.resource_group, resource_group)
            {
                continue;
            }
            results.push(HistoryEntry {
                blob_name: object.path,
                actions_taken: record.actions_taken(),
                vm_name: record.vm_name,
                resource_group: record.resource_group,
                timestamp: record.timestamp,
                outcome: record.outcome,
                notes: record.notes,
            });
        }
        results.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        results.truncate(criteria.max_results);
        let statistics = HistoryStatistics {
            success_rate: success_rate(&results),
            total_remediations: results.len(),
            days_analyzed: criteria.days,
        };
        Ok(RemediationHistory {
            total_results: results.len(),
            results,
            statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryCriteria, success_rate};
    use crate::record::{RemediationOutcome, RemediationResultRecord};
    use crate::{InMemoryKnowledgeStore, KnowledgeBase, KnowledgeStore};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn seed(
        store: &InMemoryKnowledgeStore,
        vm: &str,
        rg: &str,
        outcome: RemediationOutcome,
        age_days: i64,
    ) {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .single()
            .expect("timestamp");
        let timestamp = now - Duration::days(age_days);
        let record = RemediationResultRecord {
            vm_name: vm.to_string(),
            resource_group: rg.to_string(),
            timestamp,
            remediation_plan: json!({ "remediation_actions": [{ "step": 1 }] }),
            outcome,
            notes: None,
            record_type: "remediation_result".to_string(),
        };
        store.insert_at(
            &crate::remediation_path(vm, timestamp),
            serde_json::to_vec(&record).expect("encode"),
            timestamp,
        );
    }

    #[test]
    fn success_rate_of_empty_history_is_zero() {
        assert_eq!(success_rate(&[]), "0.0%");
    }

    #[tokio::test]
    async fn history_filters_by_window_and_vm() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        seed(&store, "web-01", "rg-a", RemediationOutcome::Success, 1);
        seed(&store, "WEB-01", "rg-a", RemediationOutcome::Failed, 2);
        seed(&store, "web-01", "rg-a", RemediationOutcome::Partial, 3);
        seed(&store, "web-01", "rg-a", RemediationOutcome::Success, 45);
        seed(&store, "db-01", "rg-a", RemediationOutcome::Success, 1);
        let knowledge = KnowledgeBase::new(store);
        let now = Utc
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .single()
            .expect("timestamp");

        let history = knowledge
            .history_at(
                &HistoryCriteria {
                    vm_name: Some("web-01".to_string()),
                    ..HistoryCriteria::default()
                },
                now,
            )
            .await
            .expect("history");
        assert_eq!(history.total_results, 3);
        let outcomes: Vec<RemediationOutcome> =
            history.results.iter().map(|entry| entry.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                RemediationOutcome::Success,
                RemediationOutcome::Failed,
                RemediationOutcome::Partial
            ]
        );
        assert_eq!(history.statistics.success_rate, "33.3%");
        assert_eq!(history.statistics.days_analyzed, 30);
        assert_eq!(history.results[0].actions_taken, 1);
    }

    #[tokio::test]
    async fn history_truncates_after_sorting() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        for age in 1..=4 {
            seed(&store, &format!("vm-{age}"), "rg-a", RemediationOutcome::Success, age);
        }
        let knowledge = KnowledgeBase::new(store);
        let now = Utc
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .single()
            .expect("timestamp");
        let history = knowledge
            .history_at(
                &HistoryCriteria {
                    max_results: 2,
                    ..HistoryCriteria::default()
                },
                now,
            )
            .await
            .expect("history");
        let names: Vec<&str> = history
            .results
            .iter()
            .map(|entry| entry.vm_name.as_str())
            .collect();
        assert_eq!(names, vec!["vm-1", "vm-2"]);
        assert_eq!(history.statistics.success_rate, "100.0%");
    }

    #[tokio::test]
    async fn save_result_overwrites_same_path() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let knowledge = KnowledgeBase::new(store.clone());
        let stamp = Utc
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .single()
            .expect("timestamp");
        let first = knowledge
            .save_result_at(
                "web-01",
                "rg-a",
                json!({ "remediation_actions": [] }),
                RemediationOutcome::Failed,
                Some("first attempt".to_string()),
                stamp,
            )
            .await
            .expect("first save");
        let second = knowledge
            .save_result_at(
                "web-01",
                "rg-a",
                json!({ "remediation_actions": [{ "step": 1 }] }),
                RemediationOutcome::Partial,
                Some("rebooted".to_string()),
                stamp,
            )
            .await
            .expect("second save");
        assert!(second.saved);
        assert_eq!(first.blob_path, second.blob_path);
        assert_eq!(
            second.blob_path,
            "remediations/2025/06/30/web-01_20250630_120000.json"
        );

        let listed = store.list_by_prefix("remediations/").await.expect("list");
        assert_eq!(listed.len(), 1);
        let history = knowledge
            .history(&HistoryCriteria::default())
            .await
            .expect("history");
        assert_eq!(history.total_results, 1);
        assert_eq!(history.results[0].outcome, RemediationOutcome::Partial);
        assert_eq!(history.results[0].notes.as_deref(), Some("rebooted"));
        assert_eq!(history.results[0].actions_taken, 1);
    }
}
