use crate::connector::{Connector, ReadResult, StorageUsage};
use crate::entity::StorageEntity;
use crate::error::{ErrorKind, Result};
use crate::options::{CreateOptions, DeleteOptions, QueryOptions, ReadOptions, TransferOptions, WriteOptions};
use crate::registry::ConnectorHandle;
use crate::transfer::{RowStatus, RowStream, TransferRow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Wraps another connector and refuses every mutation.
///
/// Listing, reading, compressing and preparing transfers go through to the
/// wrapped connector untouched.
pub struct ReadOnlyConnector {
    inner: ConnectorHandle,
}

impl ReadOnlyConnector {
    pub fn new(inner: ConnectorHandle) -> Self {
        Self { inner }
    }

    fn refuse(&self, operation: &str, path: &str) -> crate::error::Error {
        tracing::info!(connector = self.name(), operation, path, "refused mutation on read-only connector");
        exn::Exn::from(ErrorKind::NotSupported(format!("{operation} {path} on read-only connector {}", self.name())))
    }
}

#[async_trait]
impl Connector for ReadOnlyConnector {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn about(&self, cancel: &CancellationToken) -> Result<StorageUsage> {
        self.inner.about(cancel).await
    }

    async fn entities(&self, path: &str, options: &QueryOptions) -> Result<Vec<StorageEntity>> {
        self.inner.entities(path, options).await
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        Err(self.refuse("create", path))
    }

    async fn put(&self, path: &str, _content: Vec<u8>) -> Result<()> {
        Err(self.refuse("write", path))
    }

    async fn get(&self, path: &str, options: ReadOptions) -> Result<ReadResult> {
        self.inner.get(path, options).await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        Err(self.refuse("delete", path))
    }

    async fn purge_directory(&self, path: &str) -> Result<()> {
        Err(self.refuse("delete", path))
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.inner.file_exists(path).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.inner.directory_exists(path).await
    }

    async fn create(&self, path: &str, _options: CreateOptions, _cancel: &CancellationToken) -> Result<()> {
        Err(self.refuse("create", path))
    }

    async fn write(&self, path: &str, _options: WriteOptions, _content: Vec<u8>, _cancel: &CancellationToken) -> Result<()> {
        Err(self.refuse("write", path))
    }

    async fn update(&self, path: &str, _content: Vec<u8>, _cancel: &CancellationToken) -> Result<()> {
        Err(self.refuse("update", path))
    }

    async fn delete(&self, path: &str, _options: DeleteOptions, _cancel: &CancellationToken) -> Result<Vec<String>> {
        Err(self.refuse("delete", path))
    }

    async fn read(&self, path: &str, options: ReadOptions, cancel: &CancellationToken) -> Result<ReadResult> {
        self.inner.read(path, options, cancel).await
    }

    fn prepare_stream<'a>(
        &'a self,
        path: &'a str,
        options: &'a TransferOptions,
        cancel: &'a CancellationToken,
    ) -> RowStream<'a> {
        self.inner.prepare_stream(path, options, cancel)
    }

    async fn transmit_row(
        &self,
        target: &str,
        _columns: &[String],
        _row: &TransferRow,
        _options: &TransferOptions,
        _cancel: &CancellationToken,
    ) -> Result<RowStatus> {
        Err(self.refuse("transmit", target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemoryConnector, MemoryStore};
    use crate::transfer::TransferPackage;
    use std::sync::Arc;

    fn connector() -> ReadOnlyConnector {
        let store = Arc::new(MemoryStore::with_files([("bucket/a.txt", "alpha"), ("bucket/docs/b.txt", "bravo")]));
        ReadOnlyConnector::new(Arc::new(MemoryConnector::with_store("archive", store)))
    }

    #[tokio::test]
    async fn test_reads_pass_through() {
        let connector = connector();
        let cancel = CancellationToken::new();
        assert_eq!(connector.kind(), MemoryConnector::KIND);
        let listed = connector.list("bucket/", &QueryOptions::recursive(), &cancel).await.unwrap();
        assert_eq!(listed.len(), 3);
        let read = connector.read("bucket/a.txt", ReadOptions::default(), &cancel).await.unwrap();
        assert_eq!(read.content, b"alpha");
        let prepared = connector.prepare_transfer("bucket/", &TransferOptions::default(), &cancel).await.unwrap();
        assert_eq!(prepared.package.len(), 3);
    }

    #[tokio::test]
    async fn test_mutations_are_refused() {
        let connector = connector();
        let cancel = CancellationToken::new();
        let err = connector.write("bucket/c.txt", WriteOptions::default(), b"x".to_vec(), &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotSupported(_)));
        let err = connector.create("bucket/new/", CreateOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotSupported(_)));
        let err = connector.delete("bucket/a.txt", DeleteOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotSupported(_)));
        assert!(connector.exist("bucket/a.txt", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_transmit_fails_every_row() {
        let connector = connector();
        let mut package = TransferPackage::for_files();
        package.rows.push(TransferRow::file("c.txt", b"charlie".to_vec(), None));
        let report = connector
            .transmit_transfer("bucket/", &package, &TransferOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.failed().count(), 1);
    }
}
