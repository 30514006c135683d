//! Response logging into the knowledge store.

use crate::error::KnowledgeError;
use crate::record::{
    ExtractedEntities, IndexingState, RequestSection, ResponseMetadata, ResponseRecord,
    ResponseSection,
};
use crate::store::{KnowledgeStore, PutOptions};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;

/// Logger settings taken from the knowledge config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLogSettings {
    pub enabled: bool,
    pub schema_version: String,
    pub function_version: String,
}

impl Default for ResponseLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schema_version: "1.0".to_string(),
            function_version: "1.0.0".to_string(),
        }
    }
}

/// A single exchange to be logged.
#[derive(Debug, Clone, Default)]
pub struct ResponseEntry {
    pub query: String,
    pub content: String,
    pub conversation_id: String,
    pub status: String,
    pub execution_time_ms: Option<u64>,
    pub extracted_entities: ExtractedEntities,
}

/// Result of a logging attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Logged { path: String },
    Disabled,
}

/// Writes response records, never overwriting an existing one.
#[derive(Clone)]
pub struct ResponseLogger {
    store: Arc<dyn KnowledgeStore>,
    settings: ResponseLogSettings,
}

impl ResponseLogger {
    pub fn new(store: Arc<dyn KnowledgeStore>, settings: ResponseLogSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ResponseLogSettings {
        &self.settings
    }

    /// Build the record for `entry` as of `timestamp`.
    pub fn build_record(&self, entry: ResponseEntry, timestamp: DateTime<Utc>) -> ResponseRecord {
        ResponseRecord {
            version: self.settings.schema_version.clone(),
            timestamp,
            conversation_id: entry.conversation_id,
            request: RequestSection {
                query: entry.query,
                user_id: None,
                session_id: None,
            },
            response: ResponseSection {
                content: entry.content,
                status: entry.status,
                tokens_used: None,
            },
            metadata: ResponseMetadata {
                function_version: self.settings.function_version.clone(),
                execution_time_ms: entry.execution_time_ms,
                extracted_entities: entry.extracted_entities,
            },
            indexing: IndexingState::default(),
        }
    }

    /// Log one exchange. Callers decide what to do with a failure.
    pub async fn log_response(&self, entry: ResponseEntry) -> Result<LogOutcome, KnowledgeError> {
        if !self.settings.enabled {
            debug!(
                "response logging disabled (conversation_id={})",
                entry.conversation_id
            );
            return Ok(LogOutcome::Disabled);
        }
        let record = self.build_record(entry, Utc::now());
        let path = record.path();
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store
            .put(&path, bytes, PutOptions::create_new())
            .await?;
        info!("response logged (path={})", path);
        Ok(LogOutcome::Logged { path })
    }
}

#[cfg(test)]
mod tests {
    use super::{LogOutcome, ResponseEntry, ResponseLogSettings, ResponseLogger};
    use crate::record::{ExtractedEntities, ResponseRecord};
    use crate::store::{InMemoryKnowledgeStore, KnowledgeStore, PutOptions};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn entry() -> ResponseEntry {
        ResponseEntry {
            query: "Show failed VMs".to_string(),
            content: "web-01 failed".to_string(),
            conversation_id: "thread_1".to_string(),
            status: "completed".to_string(),
            execution_time_ms: Some(120),
            extracted_entities: ExtractedEntities {
                vms: vec!["web-01".to_string()],
                ..ExtractedEntities::default()
            },
        }
    }

    #[tokio::test]
    async fn logged_record_round_trips_through_store() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let logger = ResponseLogger::new(store.clone(), ResponseLogSettings::default());
        let expected = logger.build_record(entry(), Utc::now());
        let path = expected.path();
        store
            .put(
                &path,
                serde_json::to_vec(&expected).expect("encode"),
                PutOptions::create_new(),
            )
            .await
            .expect("put");
        let bytes = store.get(&path).await.expect("get");
        let decoded: ResponseRecord = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(decoded, expected);
        assert_eq!(decoded.version, "1.0");
        assert_eq!(decoded.metadata.function_version, "1.0.0");
        assert_eq!(decoded.request.user_id, None);
    }

    #[tokio::test]
    async fn log_response_writes_under_responses_prefix() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let logger = ResponseLogger::new(store.clone(), ResponseLogSettings::default());
        let outcome = logger.log_response(entry()).await.expect("log");
        let LogOutcome::Logged { path } = outcome else {
            panic!("expected logged outcome");
        };
        assert!(path.starts_with("responses/"));
        assert!(path.ends_with("-thread_1.json"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn disabled_logger_writes_nothing() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let logger = ResponseLogger::new(
            store.clone(),
            ResponseLogSettings {
                enabled: false,
                ..ResponseLogSettings::default()
            },
        );
        assert_eq!(
            logger.log_response(entry()).await.expect("log"),
            LogOutcome::Disabled
        );
        assert!(store.is_empty());
    }
}
