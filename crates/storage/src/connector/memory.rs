//! In-memory connector.

use crate::connector::{Connector, ReadResult, StorageUsage, check_cancelled};
use crate::entity::{StorageEntity, content_hash, content_type_for};
use crate::error::{ErrorKind, Result};
use crate::options::{QueryOptions, ReadOptions};
use crate::path;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct MemoryEntry {
    /// `None` marks a directory.
    content: Option<Vec<u8>>,
    hash: Option<String>,
    created: OffsetDateTime,
    modified: OffsetDateTime,
}

impl MemoryEntry {
    fn directory(now: OffsetDateTime) -> Self {
        Self { content: None, hash: None, created: now, modified: now }
    }

    fn file(content: Vec<u8>, created: OffsetDateTime, now: OffsetDateTime) -> Self {
        Self { hash: Some(content_hash(&content)), content: Some(content), created, modified: now }
    }
}

/// Entries of one container, keyed by their path inside it. Directory keys
/// end in `/`.
type Entries = BTreeMap<String, MemoryEntry>;
type Container = Arc<RwLock<Entries>>;

/// Backing store for [`MemoryConnector`]: containers of entries.
///
/// Each container has its own lock, so readers of one container never wait
/// on writers to another. The store is handed to connectors explicitly, so
/// several connectors (or a test and a connector) can share one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RwLock<BTreeMap<String, Container>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with files, creating containers and directories
    /// along the way.
    ///
    /// Panics if any path fails to normalize or is not a file path inside a
    /// container. If test setup is wrong, then the test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut containers: BTreeMap<String, Entries> = BTreeMap::new();
        for (file, content) in files {
            let normalized = match path::normalize(file.as_ref()) {
                Ok(normalized) if path::is_file(&normalized) && !path::split(&normalized).relative.is_empty() => normalized,
                _ => panic!("MemoryStore::with_files: invalid file path {}", file.as_ref()),
            };
            let parts = path::split(&normalized);
            let entries = containers.entry(parts.container.to_string()).or_default();
            insert_ancestors(entries, parts.relative, now);
            entries.insert(parts.relative.to_string(), MemoryEntry::file(content.into(), now, now));
        }
        let containers = containers.into_iter().map(|(name, entries)| (name, Arc::new(RwLock::new(entries)))).collect();
        Self { containers: RwLock::new(containers) }
    }

    async fn container(&self, name: &str) -> Option<Container> {
        self.containers.read().await.get(name).cloned()
    }

    async fn existing_container(&self, name: &str) -> Result<Container> {
        match self.container(name).await {
            Some(container) => Ok(container),
            None => exn::bail!(ErrorKind::NotFound(format!("{name}/"))),
        }
    }

    async fn ensure_container(&self, name: &str) -> Container {
        if let Some(container) = self.container(name).await {
            return container;
        }
        self.containers.write().await.entry(name.to_string()).or_default().clone()
    }

    async fn container_names(&self) -> Vec<String> {
        self.containers.read().await.keys().cloned().collect()
    }

    /// Total bytes of file content held.
    pub async fn used(&self) -> u64 {
        let containers: Vec<Container> = self.containers.read().await.values().cloned().collect();
        let mut used = 0;
        for container in containers {
            used += container.read().await.values().filter_map(|e| e.content.as_ref()).map(|c| c.len() as u64).sum::<u64>();
        }
        used
    }
}

/// Directory markers for every ancestor of `relative` inside its container.
fn insert_ancestors(entries: &mut Entries, relative: &str, now: OffsetDateTime) {
    let trimmed = relative.trim_end_matches(path::SEPARATOR);
    for (index, _) in trimmed.match_indices(path::SEPARATOR) {
        entries.entry(trimmed[..=index].to_string()).or_insert_with(|| MemoryEntry::directory(now));
    }
}

/// Whether `key` sits directly inside the directory `prefix`.
fn is_direct_child(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .map(|rest| !rest.is_empty() && !rest.trim_end_matches(path::SEPARATOR).contains(path::SEPARATOR))
        .unwrap_or(false)
}

fn to_entity(container: &str, key: &str, entry: &MemoryEntry) -> StorageEntity {
    let full_path = format!("{container}/{key}");
    let entity = match &entry.content {
        Some(content) => {
            let entity = StorageEntity::file(full_path, content.len() as u64);
            match &entry.hash {
                Some(hash) => entity.with_hash(hash.clone()),
                None => entity,
            }
        },
        None => StorageEntity::directory(full_path),
    };
    entity.with_times(Some(entry.created), Some(entry.modified))
}

/// Connector over a [`MemoryStore`].
///
/// # Examples
///
/// ```
/// use ferry_storage::{Connector, MemoryConnector, MemoryStore};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferry_storage::error::Result<()> {
/// let store = Arc::new(MemoryStore::with_files([("bucket/works/123.html", "<html>...</html>")]));
/// let connector = MemoryConnector::with_store("memory", store);
/// assert!(connector.exist("bucket/works/", &CancellationToken::new()).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    name: String,
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub const KIND: &'static str = "storage/memory";

    /// A connector over a fresh, empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_store(name, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(name: impl Into<String>, store: Arc<MemoryStore>) -> Self {
        Self { name: name.into(), store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    async fn container_entities(&self, container: &str, prefix: &str, recurse: bool) -> Result<Vec<StorageEntity>> {
        let entries = self.store.existing_container(container).await?;
        // Snapshot under the read lock; nothing is held once this returns.
        let guard = entries.read().await;
        if !prefix.is_empty() && !guard.contains_key(prefix) {
            exn::bail!(ErrorKind::NotFound(format!("{container}/{prefix}")));
        }
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| key.as_str() != prefix && (recurse || is_direct_child(key, prefix)))
            .map(|(key, entry)| to_entity(container, key, entry))
            .collect())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn about(&self, cancel: &CancellationToken) -> Result<StorageUsage> {
        check_cancelled(cancel)?;
        Ok(StorageUsage { used: Some(self.store.used().await), ..StorageUsage::default() })
    }

    async fn entities(&self, path: &str, options: &QueryOptions) -> Result<Vec<StorageEntity>> {
        if !path::is_root(path) {
            let parts = path::split(path);
            return self.container_entities(parts.container, parts.relative, options.recurse).await;
        }
        let names = self.store.container_names().await;
        let mut entities: Vec<StorageEntity> = names.iter().map(|name| StorageEntity::directory(name.as_str())).collect();
        if options.recurse {
            let listings = futures::future::try_join_all(names.iter().map(|name| self.container_entities(name, "", true)))
                .await?;
            entities.extend(listings.into_iter().flatten());
        }
        Ok(entities)
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        let parts = path::split(path);
        let container = self.store.ensure_container(parts.container).await;
        if parts.relative.is_empty() {
            return Ok(());
        }
        let now = OffsetDateTime::now_utc();
        let mut entries = container.write().await;
        insert_ancestors(&mut entries, parts.relative, now);
        entries.entry(parts.relative.to_string()).or_insert_with(|| MemoryEntry::directory(now));
        Ok(())
    }

    async fn put(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let parts = path::split(path);
        let container = self.store.existing_container(parts.container).await?;
        let now = OffsetDateTime::now_utc();
        let mut entries = container.write().await;
        insert_ancestors(&mut entries, parts.relative, now);
        let created = entries.get(parts.relative).map(|existing| existing.created).unwrap_or(now);
        entries.insert(parts.relative.to_string(), MemoryEntry::file(content, created, now));
        Ok(())
    }

    async fn get(&self, path: &str, _options: ReadOptions) -> Result<ReadResult> {
        let parts = path::split(path);
        let container = self.store.existing_container(parts.container).await?;
        let entries = container.read().await;
        let Some(MemoryEntry { content: Some(content), hash, .. }) = entries.get(parts.relative) else {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        };
        // The digest is kept from write time, so it is always returned.
        Ok(ReadResult {
            content: content.clone(),
            content_type: Some(content_type_for(path).to_string()),
            hash: hash.clone(),
        })
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let parts = path::split(path);
        let container = self.store.existing_container(parts.container).await?;
        match container.write().await.remove(parts.relative) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path.to_string())),
        }
    }

    async fn purge_directory(&self, path: &str) -> Result<()> {
        let parts = path::split(path);
        if parts.relative.is_empty() {
            return match self.store.containers.write().await.remove(parts.container) {
                Some(_) => Ok(()),
                None => exn::bail!(ErrorKind::NotFound(path.to_string())),
            };
        }
        let container = self.store.existing_container(parts.container).await?;
        let mut entries = container.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(parts.relative));
        if entries.len() == before {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let parts = path::split(path);
        let Some(container) = self.store.container(parts.container).await else {
            return Ok(false);
        };
        Ok(container.read().await.get(parts.relative).is_some_and(|entry| entry.content.is_some()))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let parts = path::split(path);
        let Some(container) = self.store.container(parts.container).await else {
            return Ok(false);
        };
        Ok(parts.relative.is_empty() || container.read().await.contains_key(parts.relative))
    }
}
