//! Append-only knowledge store for PatchPilot responses and remediation outcomes.

pub mod error;
pub mod history;
pub mod logger;
pub mod record;
pub mod search;
pub mod store;

/// Knowledge error type.
pub use error::KnowledgeError;
/// Remediation result persistence and history queries.
pub use history::{
    HistoryCriteria, HistoryEntry, HistoryStatistics, RemediationHistory, SavedResult,
};
/// Response logging.
pub use logger::{LogOutcome, ResponseEntry, ResponseLogSettings, ResponseLogger};
/// Persisted record model and path helpers.
pub use record::{
    ExtractedEntities, IndexingState, RemediationOutcome, RemediationResultRecord,
    RequestSection, ResponseMetadata, ResponseRecord, ResponseSection, remediation_path,
    response_path,
};
/// Knowledge-base search.
pub use search::{SearchCriteria, SearchHit, SearchResults};
/// Store interface and built-in backends.
pub use store::{
    FileKnowledgeStore, InMemoryKnowledgeStore, KnowledgeBase, KnowledgeStore, PutOptions,
    StoredObject,
};
