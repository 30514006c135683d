use async_trait::async_trait;
use chrono::{DateTime, Utc};
use patchpilot_knowledge::{
    InMemoryKnowledgeStore, KnowledgeError, KnowledgeStore, PutOptions, StoredObject,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory store that counts reads.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: Arc<InMemoryKnowledgeStore>,
    gets: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn insert_at(&self, path: &str, bytes: Vec<u8>, last_modified: DateTime<Utc>) {
        self.inner.insert_at(path, bytes, last_modified);
    }
}

#[async_trait]
impl KnowledgeStore for CountingStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), KnowledgeError> {
        self.inner.put(path, bytes, options).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, KnowledgeError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(path).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<StoredObject>, KnowledgeError> {
        self.inner.list_by_prefix(prefix).await
    }
}
