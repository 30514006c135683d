//! Filtered scan over logged response records.

use crate::error::KnowledgeError;
use crate::record::{RESPONSES_PREFIX, ResponseMetadata, ResponseRecord};
use crate::store::KnowledgeBase;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

fn default_max_results() -> usize {
    10
}

/// AND-combined filters; unset filters match everything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchCriteria {
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub assessment_status: Option<String>,
    #[serde(default)]
    pub error_keywords: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            vm_name: None,
            resource_group: None,
            assessment_status: None,
            error_keywords: Vec::new(),
            max_results: default_max_results(),
        }
    }
}

impl SearchCriteria {
    /// True when `record` satisfies every supplied filter.
    pub fn matches(&self, record: &ResponseRecord) -> bool {
        let entities = &record.metadata.extracted_entities;
        if let Some(vm_name) = &self.vm_name
            && !entities
                .vms
                .iter()
                .any(|vm| vm.eq_ignore_ascii_case(vm_name))
        {
            return false;
        }
        if let Some(resource_group) = &self.resource_group
            && !entities
                .resource_group
                .as_deref()
                .is_some_and(|rg| rg.eq_ignore_ascii_case(resource_group))
        {
            return false;
        }
        let content = record.response.content.to_lowercase();
        if let Some(status) = &self.assessment_status
            && !content.contains(&status.to_lowercase())
        {
            return false;
        }
        if !self.error_keywords.is_empty()
            && !self
                .error_keywords
                .iter()
                .any(|keyword| content.contains(&keyword.to_lowercase()))
        {
            return false;
        }
        true
    }
}

/// One matching record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub blob_name: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    pub metadata: ResponseMetadata,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResults {
    pub total_results: usize,
    pub results: Vec<SearchHit>,
    pub search_criteria: SearchCriteria,
}

impl KnowledgeBase {
    /// Scan response records in store order, stopping at `max_results` matches.
    ///
    /// The hits are then sorted newest first. Unreadable or malformed records
    /// are skipped with a warning. Only a failed listing is an error.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResults, KnowledgeError> {
        info!(
            "searching knowledge base (vm={:?}, rg={:?}, status={:?}, keywords={:?}, max_results={})",
            criteria.vm_name,
            criteria.resource_group,
            criteria.assessment_status,
            criteria.error_keywords,
            criteria.max_results
        );
        let mut results = Vec::new();
        if criteria.max_results > 0 {
            let objects = self.store().list_by_prefix(RESPONSES_PREFIX).await?;
            for object in objects {
                let bytes = match self.store().get(&object.path).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!("skipping unreadable record (path={}, error={})", object.path, err);
                        continue;
                    }
                };
                let record: ResponseRecord = match serde_json::from_slice(&bytes) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!("skipping malformed record (path={}, error={})", object.path, err);
                        continue;
                    }
                };
                if !criteria.matches(&record) {
                    continue;
                }
                results.push(SearchHit {
                    blob_name: object.path,
                    timestamp: record.timestamp,
                    query: record.request.query,
                    response: record.response.content,
                    metadata: record.metadata,
                    conversation_id: record.conversation_id,
                });
                if results.len() >= criteria.max_results {
                    break;
                }
            }
        }
        results.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        debug!("knowledge base search finished (matches={})", results.len());
        Ok(SearchResults {
            total_results: results.len(),
            results,
            search_criteria: criteria.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SearchCriteria;
    use crate::record::{ExtractedEntities, ResponseRecord};
    use crate::{
        InMemoryKnowledgeStore, KnowledgeBase, KnowledgeStore, PutOptions, ResponseEntry,
        ResponseLogSettings, ResponseLogger,
    };
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn record(minute: i64, content: &str, vms: &[&str], rg: Option<&str>) -> ResponseRecord {
        let logger = ResponseLogger::new(
            Arc::new(InMemoryKnowledgeStore::new()),
            ResponseLogSettings::default(),
        );
        let base = Utc
            .with_ymd_and_hms(2025, 6, 1, 8, 0, 0)
            .single()
            .expect("timestamp");
        logger.build_record(
            ResponseEntry {
                query: "status".to_string(),
                content: content.to_string(),
                conversation_id: format!("c{minute}"),
                status: "completed".to_string(),
                execution_time_ms: None,
                extracted_entities: ExtractedEntities {
                    vms: vms.iter().map(|vm| vm.to_string()).collect(),
                    resource_group: rg.map(str::to_string),
                    ..ExtractedEntities::default()
                },
            },
            base + Duration::minutes(minute),
        )
    }

    async fn seed(store: &InMemoryKnowledgeStore, record: &ResponseRecord) {
        store
            .put(
                &record.path(),
                serde_json::to_vec(record).expect("encode"),
                PutOptions::create_new(),
            )
            .await
            .expect("put");
    }

    #[test]
    fn criteria_apply_all_filters() {
        let hit = record(0, "Assessment FAILED: reboot pending", &["Web-01"], Some("RG-A"));
        let criteria = SearchCriteria {
            vm_name: Some("web-01".to_string()),
            resource_group: Some("rg-a".to_string()),
            assessment_status: Some("failed".to_string()),
            error_keywords: vec!["disk".to_string(), "Reboot".to_string()],
            ..SearchCriteria::default()
        };
        assert!(criteria.matches(&hit));

        let wrong_vm = SearchCriteria {
            vm_name: Some("db-01".to_string()),
            ..criteria.clone()
        };
        assert!(!wrong_vm.matches(&hit));

        let no_keyword = SearchCriteria {
            error_keywords: vec!["proxy".to_string()],
            ..criteria
        };
        assert!(!no_keyword.matches(&hit));
    }

    #[tokio::test]
    async fn search_sorts_newest_first_and_skips_malformed() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        seed(&store, &record(1, "failed one", &[], None)).await;
        seed(&store, &record(3, "failed three", &[], None)).await;
        seed(&store, &record(2, "failed two", &[], None)).await;
        store
            .put(
                "responses/2025/06/01/garbage.json",
                b"not json".to_vec(),
                PutOptions::create_new(),
            )
            .await
            .expect("put");

        let knowledge = KnowledgeBase::new(store);
        let results = knowledge
            .search(&SearchCriteria {
                assessment_status: Some("failed".to_string()),
                ..SearchCriteria::default()
            })
            .await
            .expect("search");
        let contents: Vec<&str> = results
            .results
            .iter()
            .map(|hit| hit.response.as_str())
            .collect();
        assert_eq!(contents, vec!["failed three", "failed two", "failed one"]);
        assert_eq!(results.total_results, 3);
    }

    #[tokio::test]
    async fn zero_max_results_reads_nothing() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        seed(&store, &record(1, "failed", &[], None)).await;
        let knowledge = KnowledgeBase::new(store);
        let results = knowledge
            .search(&SearchCriteria {
                max_results: 0,
                ..SearchCriteria::default()
            })
            .await
            .expect("search");
        assert_eq!(results.total_results, 0);
    }
}
