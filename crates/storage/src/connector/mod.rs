//! The connector capability contract and the reference connectors.
//!
//! A [`Connector`] is split in two layers:
//!
//! * **backend primitives** ([`entities`](Connector::entities),
//!   [`put`](Connector::put), [`get`](Connector::get), ...) that each
//!   connector implements against its own storage, on already normalized and
//!   validated paths;
//! * **operations** ([`list`](Connector::list), [`write`](Connector::write),
//!   [`delete`](Connector::delete), [`prepare_transfer`](Connector::prepare_transfer), ...)
//!   with default implementations that normalize and validate the path, parse
//!   the caller's query, honour cancellation, and drive the primitives.
//!
//! Callers only use operations. Connectors override an operation when their
//! backend can do better than the generic protocol, or to refuse it.

mod local;
mod memory;
mod readonly;

pub use self::local::LocalConnector;
pub use self::memory::{MemoryConnector, MemoryStore};
pub use self::readonly::ReadOnlyConnector;
use crate::archive::{self, CompressEntry};
use crate::entity::{StorageEntity, format_size};
use crate::error::{ErrorKind, Result};
use crate::options::{CompressOptions, Compression, CreateOptions, DeleteOptions, QueryOptions, ReadOptions, TransferOptions, WriteOptions};
use crate::path;
use crate::transfer::{self, Prepared, RowStatus, RowStream, TransferPackage, TransferRow, TransmitReport};
use async_trait::async_trait;
use ferry_filter::{Table, Value};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Capacity figures for a connector. `None` where the backend can't tell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub free: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    /// Set when the backend stores a digest, or when hashing was requested.
    pub hash: Option<String>,
}

/// Fail with [`Cancelled`](ErrorKind::Cancelled) once the token fires.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        exn::bail!(ErrorKind::Cancelled);
    }
    Ok(())
}

/// Uniform interface over storage, database and stream backends.
///
/// Every path is interpreted in canonical form (see [`crate::path`]): the
/// first segment is the container, directories end in `/`, and the empty
/// path is the root ("all containers"). Validation always happens before
/// any backend call is made.
///
/// # Examples
///
/// ```
/// use ferry_storage::{Connector, MemoryConnector, options::{CreateOptions, QueryOptions, WriteOptions}};
/// use tokio_util::sync::CancellationToken;
/// # async fn example() -> ferry_storage::error::Result<()> {
/// let connector = MemoryConnector::new("scratch");
/// let cancel = CancellationToken::new();
/// connector.create("bucket/docs/", CreateOptions::default(), &cancel).await?;
/// connector.write("bucket/docs/a.md", WriteOptions::default(), b"# A".to_vec(), &cancel).await?;
///
/// let options = QueryOptions { filter: Some("name LIKE '%.md'".into()), ..QueryOptions::recursive() };
/// let found = connector.list("bucket/", &options, &cancel).await?;
/// assert_eq!(found[0].full_path, "bucket/docs/a.md");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name of the configured connector instance (the key it was registered
    /// under). Used for logging only.
    fn name(&self) -> &str;

    /// Registry type id, e.g. `storage/memory`.
    fn kind(&self) -> &str;

    /// One-time setup after construction.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn about(&self, cancel: &CancellationToken) -> Result<StorageUsage> {
        check_cancelled(cancel)?;
        Ok(StorageUsage::default())
    }

    // Backend primitives.

    /// Raw entities at a normalized directory path (or the root), before any
    /// filtering. Only direct children unless `options.recurse`; metadata
    /// only when `options.include_metadata`.
    async fn entities(&self, path: &str, options: &QueryOptions) -> Result<Vec<StorageEntity>>;

    /// Create a directory (and any missing ancestors). Existing directories
    /// are left alone.
    async fn make_directory(&self, path: &str) -> Result<()>;

    /// Store a file, replacing any existing content. The container must
    /// exist; intermediate directories are created as needed.
    async fn put(&self, path: &str, content: Vec<u8>) -> Result<()>;

    async fn get(&self, path: &str, options: ReadOptions) -> Result<ReadResult>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything below it.
    async fn purge_directory(&self, path: &str) -> Result<()>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    async fn directory_exists(&self, path: &str) -> Result<bool>;

    // Operations.

    /// Create a directory or container.
    ///
    /// Idempotent, unless `options.overwrite` is `Some(false)` and the
    /// directory already exists.
    async fn create(&self, path: &str, options: CreateOptions, cancel: &CancellationToken) -> Result<()> {
        let path = path::require_directory(path)?;
        check_cancelled(cancel)?;
        if options.overwrite == Some(false) && self.directory_exists(&path).await? {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        tracing::debug!(connector = self.name(), path = %path, "creating directory");
        self.make_directory(&path).await
    }

    async fn write(&self, path: &str, options: WriteOptions, content: Vec<u8>, cancel: &CancellationToken) -> Result<()> {
        let path = path::require_file(path)?;
        check_cancelled(cancel)?;
        if !options.overwrite && self.file_exists(&path).await? {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        tracing::debug!(connector = self.name(), path = %path, bytes = content.len(), "writing file");
        self.put(&path, content).await
    }

    async fn read(&self, path: &str, options: ReadOptions, cancel: &CancellationToken) -> Result<ReadResult> {
        let path = path::require_file(path)?;
        check_cancelled(cancel)?;
        self.get(&path, options).await
    }

    async fn update(&self, path: &str, _content: Vec<u8>, _cancel: &CancellationToken) -> Result<()> {
        exn::bail!(ErrorKind::NotSupported(format!("update {path} on {}", self.kind())))
    }

    /// Delete entities.
    ///
    /// A file path removes that file. A directory path removes the file
    /// entities beneath it that pass `options.query`; with `options.purge`
    /// the query is ignored and the directory is removed with all its
    /// descendants, every one of which is reported.
    /// Purging the root is always refused.
    ///
    /// Returns the paths that were removed.
    async fn delete(&self, path: &str, options: DeleteOptions, cancel: &CancellationToken) -> Result<Vec<String>> {
        let path = path::normalize(path)?;
        if options.purge && path::is_root(&path) {
            exn::bail!(ErrorKind::InvalidPath("refusing to purge the root".to_string()));
        }
        if path::is_file(&path) {
            path::check_file(&path)?;
            check_cancelled(cancel)?;
            self.remove_file(&path).await?;
            tracing::info!(connector = self.name(), path = %path, "deleted file");
            return Ok(vec![path]);
        }
        let mut deleted = Vec::new();
        if options.purge {
            // Everything below goes, whatever the query matches.
            let below = self.list(&path, &QueryOptions::recursive(), cancel).await?;
            check_cancelled(cancel)?;
            self.purge_directory(&path).await?;
            deleted.extend(below.into_iter().map(|entity| entity.full_path));
            deleted.push(path.clone());
        } else {
            let matched = self.list(&path, &options.query, cancel).await?;
            for entity in matched.into_iter().filter(StorageEntity::is_file) {
                check_cancelled(cancel)?;
                self.remove_file(&entity.full_path).await?;
                deleted.push(entity.full_path);
            }
        }
        tracing::info!(connector = self.name(), path = %path, deleted = deleted.len(), purge = options.purge, "deleted entities");
        Ok(deleted)
    }

    /// Whether the path exists. File and directory paths are checked
    /// independently: `a/b` and `a/b/` are different questions.
    async fn exist(&self, path: &str, cancel: &CancellationToken) -> Result<bool> {
        let path = path::normalize(path)?;
        check_cancelled(cancel)?;
        match path::is_root(&path) {
            true => Ok(true),
            false if path::is_directory(&path) => self.directory_exists(&path).await,
            false => self.file_exists(&path).await,
        }
    }

    /// List the entities at a directory path, filtered, sorted and paged by
    /// `options`. The query is parsed before the backend is touched.
    async fn list(&self, path: &str, options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<StorageEntity>> {
        let path = path::normalize(path)?;
        if !path::is_directory(&path) {
            exn::bail!(ErrorKind::NotADirectory(path));
        }
        let engine = options.engine()?;
        check_cancelled(cancel)?;
        let raw = self.entities(&path, options).await?;
        tracing::debug!(connector = self.name(), path = %path, found = raw.len(), "listed raw entities");
        engine.apply(raw).map_err(ErrorKind::filter)
    }

    /// The listing view of some entities: projected onto the requested
    /// fields, with summarized sizes unless `options.full`.
    fn project(&self, entities: &[StorageEntity], options: &QueryOptions) -> Result<Table> {
        let mut table = options.engine()?.project(entities).map_err(ErrorKind::filter)?;
        if !options.full {
            table.map_column("size", |size| match size {
                Value::Integer(bytes) => Value::String(format_size(*bytes as u64)),
                other => other.clone(),
            });
        }
        Ok(table)
    }

    /// Read and compress every matched file: into one zip archive, or into
    /// one entry per file for the other formats. Files that can't be read
    /// are skipped with a warning; nothing readable is
    /// [`NotFound`](ErrorKind::NotFound).
    async fn compress(&self, path: &str, options: CompressOptions, cancel: &CancellationToken) -> Result<Vec<CompressEntry>> {
        let path = path::normalize(path)?;
        let files = match path::is_file(&path) {
            true => vec![path.clone()],
            false => {
                let listed = self.list(&path, &options.query, cancel).await?;
                listed.into_iter().filter(StorageEntity::is_file).map(|entity| entity.full_path).collect()
            },
        };
        let mut read = Vec::with_capacity(files.len());
        for file in files {
            check_cancelled(cancel)?;
            match self.read(&file, ReadOptions::default(), cancel).await {
                Ok(content) => read.push((file, content)),
                Err(err) => tracing::warn!(connector = self.name(), path = %file, error = %*err, "skipping unreadable file"),
            }
        }
        if read.is_empty() {
            exn::bail!(ErrorKind::NotFound(path));
        }
        if options.compression == Compression::Zip {
            return Ok(vec![archive::bundle(&path, &read)?]);
        }
        let mut entries = Vec::with_capacity(read.len());
        for (file, content) in read {
            match archive::compress(&file, content, options.compression) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(connector = self.name(), path = %file, error = %*err, "skipping file"),
            }
        }
        if entries.is_empty() {
            exn::bail!(ErrorKind::NotFound(path));
        }
        Ok(entries)
    }

    /// Phase one of a transfer, as a stream of rows in listing order. The
    /// package columns come first, ahead of any row.
    ///
    /// Rows that fail to read come through as [`TransferRow`](ErrorKind::TransferRow)
    /// errors and the stream carries on. Any other error ends the stream.
    fn prepare_stream<'a>(
        &'a self,
        path: &'a str,
        options: &'a TransferOptions,
        cancel: &'a CancellationToken,
    ) -> RowStream<'a> {
        Box::pin(transfer::prepare_stream(self, path, options, cancel))
    }

    /// Phase one of a transfer, collected into a whole package.
    async fn prepare_transfer(
        &self,
        path: &str,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<Prepared> {
        transfer::collect(self.prepare_stream(path, options, cancel)).await
    }

    /// Apply one row of a package below `target`, returning what was done.
    /// `columns` are the package columns the row's items line up with.
    ///
    /// The default handles directory markers and file rows and refuses
    /// tabular rows.
    async fn transmit_row(
        &self,
        target: &str,
        _columns: &[String],
        row: &TransferRow,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<RowStatus> {
        transfer::transmit_row(self, target, row, options, cancel).await
    }

    /// Phase two of a transfer: apply every row in order. Row failures are
    /// recorded in the report and do not stop the batch.
    async fn transmit_transfer(
        &self,
        path: &str,
        package: &TransferPackage,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<TransmitReport> {
        transfer::transmit(self, path, package, options, cancel).await
    }
}
