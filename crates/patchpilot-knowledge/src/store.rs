//! Knowledge store interface with filesystem and in-memory backends.

use crate::error::KnowledgeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

/// Options for a single `put`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Replace an existing object instead of failing with `AlreadyExists`.
    pub overwrite: bool,
}

impl PutOptions {
    /// Create-if-absent write.
    pub fn create_new() -> Self {
        Self { overwrite: false }
    }

    /// Write that replaces any existing object.
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// Listing entry returned by `list_by_prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Store-relative path using `/` separators.
    pub path: String,
    /// Last write time.
    pub last_modified: DateTime<Utc>,
}

/// Key to bytes store with hierarchical paths and prefix listing.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Write an object; fails with `AlreadyExists` unless `options.overwrite`.
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), KnowledgeError>;

    /// Read an object.
    async fn get(&self, path: &str) -> Result<Vec<u8>, KnowledgeError>;

    /// List objects whose path starts with `prefix`, ordered by path.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<StoredObject>, KnowledgeError>;
}

/// Shared handle over a store, used by search, history, and result persistence.
#[derive(Clone)]
pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeBase {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileKnowledgeStore {
    root: PathBuf,
}

impl FileKnowledgeStore {
    /// Create a store under `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized file knowledge store (root={})", root.display());
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store path to a file under the root, rejecting escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, KnowledgeError> {
        let relative = Path::new(path);
        if path.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(KnowledgeError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Suffix of in-flight writes; never listed.
const TEMP_SUFFIX: &str = ".tmp";

/// Staging file next to `target`, so the final rename stays on one filesystem.
fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}{TEMP_SUFFIX}", Uuid::new_v4()))
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Move a fully written temp file into place.
///
/// Without `overwrite` the target is linked rather than renamed, so an
/// existing object is refused atomically.
fn publish(temp: &Path, target: &Path, overwrite: bool) -> std::io::Result<()> {
    if overwrite {
        std::fs::rename(temp, target)
    } else {
        std::fs::hard_link(temp, target)?;
        std::fs::remove_file(temp)
    }
}

#[async_trait]
impl KnowledgeStore for FileKnowledgeStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), KnowledgeError> {
        let target = self.resolve(path)?;
        if !options.overwrite && target.exists() {
            return Err(KnowledgeError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = temp_path(&target);
        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|()| publish(&temp, &target, options.overwrite));
        if let Err(err) = written {
            if let Err(cleanup) = std::fs::remove_file(&temp)
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(
                    "failed to remove staging file (path={}, error={})",
                    temp.display(),
                    cleanup
                );
            }
            if err.kind() == ErrorKind::AlreadyExists {
                return Err(KnowledgeError::AlreadyExists(path.to_string()));
            }
            return Err(err.into());
        }
        debug!(
            "stored knowledge object (path={}, bytes={}, overwrite={})",
            path,
            bytes.len(),
            options.overwrite
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, KnowledgeError> {
        let target = self.resolve(path)?;
        match std::fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(KnowledgeError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<StoredObject>, KnowledgeError> {
        // Walk only the deepest directory the prefix names.
        let prefix_dir = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
        let start = if prefix_dir.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix_dir)?
        };
        let mut objects = Vec::new();
        if !start.is_dir() {
            return Ok(objects);
        }
        for entry in WalkDir::new(&start).follow_links(false) {
            let entry = entry.map_err(|err| {
                KnowledgeError::Io(std::io::Error::other(err.to_string()))
            })?;
            if !entry.file_type().is_file() || is_temp_file(&entry.file_name().to_string_lossy())
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !path.starts_with(prefix) {
                continue;
            }
            let modified = entry.metadata().map_err(|err| {
                KnowledgeError::Io(std::io::Error::other(err.to_string()))
            })?;
            let last_modified = modified
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            objects.push(StoredObject {
                path,
                last_modified,
            });
        }
        objects.sort_by(|left, right| left.path.cmp(&right.path));
        debug!(
            "listed knowledge objects (prefix={}, count={})",
            prefix,
            objects.len()
        );
        Ok(objects)
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// In-memory store, used when persistence is not configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    objects: RwLock<BTreeMap<String, StoredBlob>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Write with an explicit modification time, replacing any existing object.
    pub fn insert_at(&self, path: &str, bytes: Vec<u8>, last_modified: DateTime<Utc>) {
        self.objects.write().insert(
            path.to_string(),
            StoredBlob {
                bytes,
                last_modified,
            },
        );
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), KnowledgeError> {
        if path.is_empty() {
            return Err(KnowledgeError::InvalidPath(path.to_string()));
        }
        let mut objects = self.objects.write();
        if !options.overwrite && objects.contains_key(path) {
            return Err(KnowledgeError::AlreadyExists(path.to_string()));
        }
        objects.insert(
            path.to_string(),
            StoredBlob {
                bytes,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, KnowledgeError> {
        self.objects
            .read()
            .get(path)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| KnowledgeError::NotFound(path.to_string()))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<StoredObject>, KnowledgeError> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, blob)| StoredObject {
                path: path.clone(),
                last_modified: blob.last_modified,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileKnowledgeStore, InMemoryKnowledgeStore, KnowledgeStore, PutOptions};
    use crate::KnowledgeError;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_refuses_overwrite_without_flag() {
        let temp = tempdir().expect("tempdir");
        let store = FileKnowledgeStore::new(temp.path()).expect("store");
        store
            .put("responses/a.json", b"one".to_vec(), PutOptions::create_new())
            .await
            .expect("first put");
        let err = store
            .put("responses/a.json", b"two".to_vec(), PutOptions::create_new())
            .await
            .expect_err("second put");
        assert!(matches!(err, KnowledgeError::AlreadyExists(_)));
        assert_eq!(store.get("responses/a.json").await.expect("get"), b"one");

        store
            .put("responses/a.json", b"three".to_vec(), PutOptions::overwrite())
            .await
            .expect("overwrite");
        assert_eq!(store.get("responses/a.json").await.expect("get"), b"three");
    }

    #[tokio::test]
    async fn file_store_leaves_no_staging_files() {
        let temp = tempdir().expect("tempdir");
        let store = FileKnowledgeStore::new(temp.path()).expect("store");
        store
            .put("responses/2025/01/01/a.json", b"{}".to_vec(), PutOptions::create_new())
            .await
            .expect("first put");
        let err = store
            .put("responses/2025/01/01/a.json", b"[]".to_vec(), PutOptions::create_new())
            .await
            .expect_err("second put");
        assert!(matches!(err, KnowledgeError::AlreadyExists(_)));
        store
            .put("responses/2025/01/01/b.json", b"1".to_vec(), PutOptions::overwrite())
            .await
            .expect("overwrite put");

        let mut names: Vec<String> = std::fs::read_dir(temp.path().join("responses/2025/01/01"))
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.json".to_string(), "b.json".to_string()]);
        assert_eq!(
            store.get("responses/2025/01/01/a.json").await.expect("get"),
            b"{}"
        );
    }

    #[tokio::test]
    async fn file_store_skips_staging_files_and_missing_prefixes() {
        let temp = tempdir().expect("tempdir");
        let store = FileKnowledgeStore::new(temp.path()).expect("store");
        store
            .put("responses/2025/a.json", b"{}".to_vec(), PutOptions::create_new())
            .await
            .expect("put");
        std::fs::write(temp.path().join("responses/2025/.b.json.1.tmp"), b"{").expect("stage");

        let listed = store.list_by_prefix("responses/2025/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "responses/2025/a.json");
        assert!(
            store
                .list_by_prefix("remediations/")
                .await
                .expect("list missing")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn file_store_lists_by_prefix_in_path_order() {
        let temp = tempdir().expect("tempdir");
        let store = FileKnowledgeStore::new(temp.path()).expect("store");
        for path in [
            "responses/2025/01/02/b.json",
            "remediations/2025/01/01/x.json",
            "responses/2025/01/01/a.json",
        ] {
            store
                .put(path, b"{}".to_vec(), PutOptions::create_new())
                .await
                .expect("put");
        }
        let listed: Vec<String> = store
            .list_by_prefix("responses/")
            .await
            .expect("list")
            .into_iter()
            .map(|object| object.path)
            .collect();
        assert_eq!(
            listed,
            vec![
                "responses/2025/01/01/a.json".to_string(),
                "responses/2025/01/02/b.json".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn file_store_rejects_escaping_paths() {
        let temp = tempdir().expect("tempdir");
        let store = FileKnowledgeStore::new(temp.path()).expect("store");
        let err = store
            .put("../outside.json", Vec::new(), PutOptions::overwrite())
            .await
            .expect_err("escape");
        assert!(matches!(err, KnowledgeError::InvalidPath(_)));
        let err = store.get("missing.json").await.expect_err("missing");
        assert!(matches!(err, KnowledgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn memory_store_honours_overwrite_flag_and_prefix() {
        let store = InMemoryKnowledgeStore::new();
        store
            .put("responses/a", b"1".to_vec(), PutOptions::create_new())
            .await
            .expect("put");
        store
            .put("responsesX/b", b"2".to_vec(), PutOptions::create_new())
            .await
            .expect("put");
        assert!(matches!(
            store
                .put("responses/a", b"3".to_vec(), PutOptions::create_new())
                .await,
            Err(KnowledgeError::AlreadyExists(_))
        ));
        let listed = store.list_by_prefix("responses/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "responses/a");
        assert_eq!(store.len(), 2);
    }
}
