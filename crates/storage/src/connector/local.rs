//! Local filesystem connector.
//!
//! Entities live below a configured root directory. The root's top-level
//! directories are the containers; files directly in the root belong to no
//! container and are never listed.

use crate::connector::{Connector, ReadResult};
use crate::entity::{MetadataValue, StorageEntity, content_hash, content_type_for};
use crate::error::{ErrorKind, Result, io_error};
use crate::options::{QueryOptions, ReadOptions};
use crate::path;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    Entity(StorageEntity),
    Descend(PathBuf, StorageEntity),
    Skip,
}

/// Connector over a directory on the local filesystem.
///
/// # Examples
///
/// ```no_run
/// use ferry_storage::LocalConnector;
///
/// # fn example() -> ferry_storage::error::Result<()> {
/// let connector = LocalConnector::new("disk", "/srv/ferry")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalConnector {
    name: String,
    /// Absolute directory holding the containers.
    root: PathBuf,
}

impl LocalConnector {
    pub const KIND: &'static str = "storage/local";

    /// Create a connector rooted at an absolute directory, creating the
    /// directory if it doesn't exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::NotADirectory(root.display().to_string()));
            }
        } else {
            sync_create_dir(&root).map_err(|e| io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a normalized storage path. Normalized paths
    /// never contain `..`, so the result stays below the root.
    fn absolute_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_end_matches(path::SEPARATOR))
    }

    /// Storage path of a filesystem location below the root.
    fn storage_path(&self, absolute: &Path, directory: bool) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).map_err(|_| {
            exn::Exn::from(ErrorKind::InvalidPath(format!("{} is not within {}", absolute.display(), self.root.display())))
        })?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => match segment.to_str() {
                    Some(segment) => segments.push(segment),
                    None => exn::bail!(ErrorKind::InvalidPath(absolute.display().to_string())),
                },
                _ => exn::bail!(ErrorKind::InvalidPath(absolute.display().to_string())),
            }
        }
        let mut storage_path = segments.join("/");
        if directory {
            storage_path.push(path::SEPARATOR);
        }
        Ok(storage_path)
    }

    fn entity(storage_path: String, metadata: &Metadata, include_metadata: bool) -> StorageEntity {
        let entity = match metadata.is_dir() {
            true => StorageEntity::directory(storage_path),
            false => StorageEntity::file(storage_path, metadata.len()),
        };
        let created = metadata.created().ok().map(OffsetDateTime::from);
        let modified = metadata.modified().ok().map(OffsetDateTime::from);
        let entity = entity.with_times(created, modified);
        if !include_metadata {
            return entity;
        }
        let hidden = entity.name.starts_with('.');
        entity
            .with_metadata("readonly", MetadataValue::Bool(metadata.permissions().readonly()))
            .with_metadata("hidden", MetadataValue::Bool(hidden))
    }

    async fn process_entry(&self, entry: DirEntry, include_metadata: bool) -> Result<WalkEntry> {
        let absolute = entry.path();
        let metadata = entry.metadata().await.map_err(|e| io_error(e, &absolute.display().to_string()))?;
        if metadata.is_dir() {
            let storage_path = self.storage_path(&absolute, true)?;
            return Ok(WalkEntry::Descend(absolute, Self::entity(storage_path, &metadata, include_metadata)));
        }
        if metadata.is_file() {
            let storage_path = self.storage_path(&absolute, false)?;
            // Files in the root itself are outside every container.
            if !storage_path.contains(path::SEPARATOR) {
                return Ok(WalkEntry::Skip);
            }
            return Ok(WalkEntry::Entity(Self::entity(storage_path, &metadata, include_metadata)));
        }
        // Note: silently drop what is most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    /// Entities below `start`, only its direct children when `shallow`.
    async fn walk(&self, start: PathBuf, shallow: bool, include_metadata: bool) -> Result<Vec<StorageEntity>> {
        let mut entities = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            let display = current.display().to_string();
            let mut entries = fs::read_dir(&current).await.map_err(|e| io_error(e, &display))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(e, &display))? {
                match self.process_entry(entry, include_metadata).await? {
                    WalkEntry::Entity(entity) => entities.push(entity),
                    WalkEntry::Descend(directory, entity) => {
                        entities.push(entity);
                        if !shallow {
                            stack.push(directory);
                        }
                    },
                    WalkEntry::Skip => {},
                }
            }
        }
        Ok(entities)
    }

    async fn stat_of(&self, path: &str) -> Result<Option<Metadata>> {
        match fs::metadata(self.absolute_path(path)).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(err, path)),
        }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn entities(&self, path: &str, options: &QueryOptions) -> Result<Vec<StorageEntity>> {
        if !path::is_root(path) && !self.stat_of(path).await?.is_some_and(|m| m.is_dir()) {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        }
        let mut entities = self.walk(self.absolute_path(path), path::is_root(path) || !options.recurse, options.include_metadata).await?;
        if path::is_root(path) && options.recurse {
            // One walk per container, all at once.
            let walks = entities.iter().map(|container| self.walk(self.absolute_path(&container.full_path), false, options.include_metadata));
            let listings = futures::future::try_join_all(walks).await?;
            entities.extend(listings.into_iter().flatten());
        }
        entities.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(entities)
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.absolute_path(path)).await.map_err(|e| io_error(e, path))
    }

    async fn put(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let container = format!("{}/", path::split(path).container);
        if !self.stat_of(&container).await?.is_some_and(|m| m.is_dir()) {
            exn::bail!(ErrorKind::NotFound(container));
        }
        let absolute = self.absolute_path(path);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(e, path))?;
        }
        fs::write(&absolute, content).await.map_err(|e| io_error(e, path))
    }

    async fn get(&self, path: &str, options: ReadOptions) -> Result<ReadResult> {
        if !self.stat_of(path).await?.is_some_and(|m| m.is_file()) {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        }
        let content = fs::read(self.absolute_path(path)).await.map_err(|e| io_error(e, path))?;
        let hash = options.hashing.then(|| content_hash(&content));
        Ok(ReadResult { content, content_type: Some(content_type_for(path).to_string()), hash })
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(self.absolute_path(path)).await.map_err(|e| io_error(e, path))
    }

    async fn purge_directory(&self, path: &str) -> Result<()> {
        fs::remove_dir_all(self.absolute_path(path)).await.map_err(|e| io_error(e, path))
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat_of(path).await?.is_some_and(|m| m.is_file()))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat_of(path).await?.is_some_and(|m| m.is_dir()))
    }
}
