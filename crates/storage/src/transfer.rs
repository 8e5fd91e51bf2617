//! Transfer packages and the generic prepare/transmit protocol steps.
//!
//! A source connector *prepares* a [`TransferPackage`] from a subtree: one
//! [`TransferRow`] per entity, keyed by its path relative to the prepared
//! path. A destination connector *transmits* the package by resolving each
//! key against its own target path. Neither side knows what the other is.
//!
//! Tabular sources prepare rows of column values instead of file content,
//! see [`prepare_table`].

use crate::connector::Connector;
use crate::error::{ErrorKind, Result};
use crate::options::{CreateOptions, QueryOptions, ReadOptions, TransferOptions, WriteOptions};
use crate::path;
use async_stream::stream;
use exn::Exn;
use ferry_filter::{Table, Value};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<PrepareItem>> + Send + 'a>>;

/// Columns of a package prepared from a file-based source.
pub const FILE_COLUMNS: [&str; 3] = ["path", "content", "contentType"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRow {
    /// Path relative to the prepared path. Directory keys end in `/`.
    pub key: String,
    /// `None` marks a directory.
    #[serde(with = "base64_content")]
    pub content: Option<Vec<u8>>,
    pub content_type: Option<String>,
    /// Column values, for sources that are tabular rather than file based.
    pub items: Option<Vec<Value>>,
}

impl TransferRow {
    pub fn directory(key: impl Into<String>) -> Self {
        Self { key: key.into(), content: None, content_type: None, items: None }
    }

    pub fn file(key: impl Into<String>, content: Vec<u8>, content_type: Option<String>) -> Self {
        Self { key: key.into(), content: Some(content), content_type, items: None }
    }

    pub fn tabular(key: impl Into<String>, items: Vec<Value>) -> Self {
        Self { key: key.into(), content: None, content_type: None, items: Some(items) }
    }

    pub fn is_directory(&self) -> bool {
        self.content.is_none() && self.items.is_none()
    }

    pub fn is_tabular(&self) -> bool {
        self.items.is_some()
    }
}

/// What a prepare stream yields: the package columns, once, ahead of the
/// rows they describe.
#[derive(Debug, Clone, PartialEq)]
pub enum PrepareItem {
    Columns(Vec<String>),
    Row(TransferRow),
}

fn file_columns() -> Vec<String> {
    FILE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferPackage {
    pub columns: Vec<String>,
    pub rows: Vec<TransferRow>,
}

impl TransferPackage {
    pub fn for_files() -> Self {
        Self { columns: file_columns(), rows: Vec::new() }
    }

    /// The tabular rows of the package as a table under its columns.
    pub fn to_table(&self) -> Table {
        Table { columns: self.columns.clone(), rows: self.rows.iter().filter_map(|row| row.items.clone()).collect() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row keys must be unique within a package, and tabular rows must have
    /// one value per column.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            if !seen.insert(row.key.as_str()) {
                exn::bail!(ErrorKind::InvalidPackage(format!("duplicate row key `{}`", row.key)));
            }
            check_row(&self.columns, row)?;
        }
        Ok(())
    }
}

/// A tabular row must carry one value per column.
pub fn check_row(columns: &[String], row: &TransferRow) -> Result<()> {
    if let Some(items) = &row.items
        && items.len() != columns.len()
    {
        exn::bail!(ErrorKind::InvalidPackage(format!(
            "row `{}` has {} values for {} columns",
            row.key,
            items.len(),
            columns.len()
        )));
    }
    Ok(())
}

/// A row that could not be prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub key: String,
    pub reason: String,
}

/// Result of phase one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prepared {
    pub package: TransferPackage,
    pub failures: Vec<RowFailure>,
    /// Preparation stopped early because the token fired.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RowStatus {
    Created,
    Written,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub key: String,
    /// Destination path the key resolved to, when it resolved at all.
    pub path: Option<String>,
    #[serde(flatten)]
    pub status: RowStatus,
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, RowStatus::Failed { .. })
    }
}

/// Result of phase two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitReport {
    pub outcomes: Vec<RowOutcome>,
    pub cancelled: bool,
}

impl TransmitReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// What a prepare stream item means to whoever is consuming it.
pub enum Step {
    Columns(Vec<String>),
    Row(TransferRow),
    Failed(RowFailure),
    Cancelled,
}

/// Sort a prepare stream item into columns, a row, a recorded row failure or
/// the end of preparation. Anything else is a fatal error for the whole
/// transfer.
pub fn classify(item: Result<PrepareItem>) -> Result<Step> {
    match item {
        Ok(PrepareItem::Columns(columns)) => Ok(Step::Columns(columns)),
        Ok(PrepareItem::Row(row)) => Ok(Step::Row(row)),
        Err(err) => match &*err {
            ErrorKind::TransferRow { key, reason } => Ok(Step::Failed(RowFailure { key: key.clone(), reason: reason.clone() })),
            ErrorKind::Cancelled => Ok(Step::Cancelled),
            _ => Err(err),
        },
    }
}

pub(crate) fn prepare_stream<'a, C: Connector + ?Sized>(
    connector: &'a C,
    path: &'a str,
    options: &'a TransferOptions,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<PrepareItem>> + Send + 'a {
    stream! {
        let path = match path::normalize(path) {
            Ok(path) => path,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        yield Ok(PrepareItem::Columns(file_columns()));
        if path::is_file(&path) {
            let key = path::name(&path).to_string();
            yield read_row(connector, &path, key, cancel).await;
            return;
        }
        // Keys are relative to the prepared path, so everything beneath it
        // has to be listed, whatever the caller asked for.
        let query = QueryOptions { recurse: true, ..options.query.clone() };
        let entities = match connector.list(&path, &query, cancel).await {
            Ok(entities) => entities,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        tracing::debug!(connector = connector.name(), path = %path, entities = entities.len(), "preparing transfer");
        for entity in entities {
            if cancel.is_cancelled() {
                yield Err(Exn::from(ErrorKind::Cancelled));
                return;
            }
            let Some(key) = path::relative_to(&entity.full_path, &path).filter(|key| !key.is_empty()) else {
                continue;
            };
            let key = key.to_string();
            if entity.is_directory() {
                yield Ok(PrepareItem::Row(TransferRow::directory(key)));
            } else {
                yield read_row(connector, &entity.full_path, key, cancel).await;
            }
        }
    }
}

async fn read_row<C: Connector + ?Sized>(
    connector: &C,
    full_path: &str,
    key: String,
    cancel: &CancellationToken,
) -> Result<PrepareItem> {
    match connector.read(full_path, ReadOptions::default(), cancel).await {
        Ok(read) => Ok(PrepareItem::Row(TransferRow::file(key, read.content, read.content_type))),
        Err(err) if matches!(&*err, ErrorKind::Cancelled) => Err(err),
        Err(err) => {
            let reason = (*err).to_string();
            tracing::warn!(connector = connector.name(), key = %key, reason = %reason, "skipping row that could not be read");
            Err(err.raise(ErrorKind::TransferRow { key, reason }))
        },
    }
}

/// Prepare the rows of a table, shaped by the caller's query: filtered,
/// sorted, paged and projected. Keys are row positions in the shaped table.
///
/// Tabular connectors build their
/// [`prepare_stream`](Connector::prepare_stream) on this once they have
/// loaded their rows.
pub fn prepare_table<'a>(
    table: &'a Table,
    options: &'a TransferOptions,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<PrepareItem>> + Send + 'a {
    stream! {
        let shaped = match options.query.engine().and_then(|engine| table.shape(&engine).map_err(ErrorKind::filter)) {
            Ok(shaped) => shaped,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        tracing::debug!(rows = shaped.len(), columns = shaped.columns.len(), "preparing table");
        yield Ok(PrepareItem::Columns(shaped.columns));
        for (index, items) in shaped.rows.into_iter().enumerate() {
            if cancel.is_cancelled() {
                yield Err(Exn::from(ErrorKind::Cancelled));
                return;
            }
            yield Ok(PrepareItem::Row(TransferRow::tabular(index.to_string(), items)));
        }
    }
}

/// Drain a prepare stream into a whole package.
pub(crate) async fn collect(mut rows: RowStream<'_>) -> Result<Prepared> {
    let mut prepared = Prepared::default();
    while let Some(item) = rows.next().await {
        match classify(item)? {
            Step::Columns(columns) => prepared.package.columns = columns,
            Step::Row(row) => prepared.package.rows.push(row),
            Step::Failed(failure) => prepared.failures.push(failure),
            Step::Cancelled => {
                prepared.cancelled = true;
                break;
            },
        }
    }
    prepared.package.validate()?;
    Ok(prepared)
}

/// Resolve where a row lands. Onto a file path, a package can only deliver
/// that one file.
fn resolve_target(target: &str, row: &TransferRow) -> Result<String> {
    if path::is_directory(target) {
        return path::join(target, &row.key);
    }
    if row.is_directory() {
        exn::bail!(ErrorKind::NotADirectory(target.to_string()));
    }
    Ok(target.to_string())
}

/// Apply one row on a file based connector. Tabular rows need a connector
/// that understands columns.
pub(crate) async fn transmit_row<C: Connector + ?Sized>(
    connector: &C,
    target: &str,
    row: &TransferRow,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<RowStatus> {
    if row.is_tabular() {
        exn::bail!(ErrorKind::NotSupported(format!("tabular row `{}` on {}", row.key, connector.kind())));
    }
    let destination = resolve_target(target, row)?;
    let Some(content) = &row.content else {
        connector.create(&destination, CreateOptions::default(), cancel).await?;
        return Ok(RowStatus::Created);
    };
    if let Some(parent) = path::parent(&destination)
        && !path::is_root(parent)
    {
        connector.create(parent, CreateOptions::default(), cancel).await?;
    }
    connector.write(&destination, WriteOptions { overwrite: options.overwrite }, content.clone(), cancel).await?;
    Ok(RowStatus::Written)
}

pub(crate) async fn transmit<C: Connector + ?Sized>(
    connector: &C,
    path: &str,
    package: &TransferPackage,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<TransmitReport> {
    let target = path::normalize(path)?;
    package.validate()?;
    if path::is_file(&target) && package.len() > 1 {
        exn::bail!(ErrorKind::NotADirectory(target));
    }
    let mut report = TransmitReport::default();
    for row in &package.rows {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.outcomes.push(outcome(connector, &target, &package.columns, row, options, cancel).await);
    }
    tracing::info!(
        connector = connector.name(),
        path = %target,
        succeeded = report.succeeded(),
        failed = report.outcomes.len() - report.succeeded(),
        cancelled = report.cancelled,
        "transmitted package"
    );
    Ok(report)
}

/// Transmit one row and record how it went. Never fails.
pub async fn outcome<C: Connector + ?Sized>(
    connector: &C,
    target: &str,
    columns: &[String],
    row: &TransferRow,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> RowOutcome {
    let path = resolve_target(target, row).ok();
    let status = match connector.transmit_row(target, columns, row, options, cancel).await {
        Ok(status) => status,
        Err(err) => {
            let reason = (*err).to_string();
            tracing::warn!(connector = connector.name(), key = %row.key, reason = %reason, "row failed to transmit");
            RowStatus::Failed { reason }
        },
    };
    RowOutcome { key: row.key.clone(), path, status }
}

/// Row content travels as base64 text in the JSON form of a package.
mod base64_content {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match content {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => STANDARD.decode(text).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemoryConnector, MemoryStore};
    use futures::StreamExt;
    use rstest::rstest;
    use std::sync::Arc;

    fn source() -> MemoryConnector {
        let store = MemoryStore::with_files([
            ("src/project/readme.md", "# project"),
            ("src/project/docs/a.txt", "alpha"),
            ("src/project/docs/b.txt", "bravo"),
        ]);
        MemoryConnector::with_store("source", Arc::new(store))
    }

    fn keys(package: &TransferPackage) -> Vec<&str> {
        package.rows.iter().map(|row| row.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_prepare_directory() {
        let prepared = source()
            .prepare_transfer("src/project/", &TransferOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys(&prepared.package), vec!["docs/", "docs/a.txt", "docs/b.txt", "readme.md"]);
        assert!(prepared.package.rows[0].is_directory());
        assert_eq!(prepared.package.rows[1].content.as_deref(), Some(&b"alpha"[..]));
        assert_eq!(prepared.package.columns, FILE_COLUMNS);
        assert!(prepared.failures.is_empty());
        assert!(!prepared.cancelled);
    }

    #[tokio::test]
    async fn test_prepare_file() {
        let prepared = source()
            .prepare_transfer("src/project/docs/b.txt", &TransferOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys(&prepared.package), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn test_prepare_honours_filter() {
        let options = TransferOptions {
            query: QueryOptions { filter: Some("name LIKE '%.txt'".into()), ..Default::default() },
            ..Default::default()
        };
        let prepared =
            source().prepare_transfer("src/project/", &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(keys(&prepared.package), vec!["docs/a.txt", "docs/b.txt"]);
    }

    #[tokio::test]
    async fn test_prepare_stream_stops_when_cancelled() {
        let connector = source();
        let cancel = CancellationToken::new();
        let options = TransferOptions::default();
        let mut rows = connector.prepare_stream("src/project/", &options, &cancel);
        assert!(matches!(classify(rows.next().await.unwrap()).unwrap(), Step::Columns(columns) if columns == FILE_COLUMNS));
        assert!(matches!(classify(rows.next().await.unwrap()).unwrap(), Step::Row(_)));
        cancel.cancel();
        assert!(matches!(classify(rows.next().await.unwrap()).unwrap(), Step::Cancelled));
        assert!(rows.next().await.is_none());
    }

    #[tokio::test]
    async fn test_prepare_invalid_path_is_fatal() {
        let err = source()
            .prepare_transfer("src/../../etc/", &TransferOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_classify() {
        let failed = classify(Err(Exn::from(ErrorKind::TransferRow { key: "a".into(), reason: "gone".into() })));
        assert!(matches!(failed.unwrap(), Step::Failed(RowFailure { key, .. }) if key == "a"));
        let fatal = classify(Err(Exn::from(ErrorKind::BackendUnavailable("src/".into()))));
        assert!(fatal.is_err());
    }

    #[test]
    fn test_duplicate_keys() {
        let mut package = TransferPackage::for_files();
        package.rows.push(TransferRow::file("a.txt", b"one".to_vec(), None));
        package.rows.push(TransferRow::file("a.txt", b"two".to_vec(), None));
        let err = package.validate().unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidPackage("duplicate row key `a.txt`".into()));
    }

    #[rstest]
    #[case("dst/copy/", TransferRow::file("docs/a.txt", vec![], None), Ok("dst/copy/docs/a.txt"))]
    #[case("dst/copy/", TransferRow::directory("docs/"), Ok("dst/copy/docs/"))]
    #[case("dst/single.txt", TransferRow::file("a.txt", vec![], None), Ok("dst/single.txt"))]
    #[case("dst/single.txt", TransferRow::directory("docs/"), Err(ErrorKind::NotADirectory("dst/single.txt".into())))]
    fn test_resolve_target(
        #[case] target: &str,
        #[case] row: TransferRow,
        #[case] expected: std::result::Result<&str, ErrorKind>,
    ) {
        let resolved = resolve_target(target, &row).map_err(|err| (*err).clone());
        assert_eq!(resolved, expected.map(str::to_string));
    }

    #[tokio::test]
    async fn test_transmit_onto_file_path() {
        let destination = MemoryConnector::new("destination");
        let cancel = CancellationToken::new();
        destination.create("dst/", CreateOptions::default(), &cancel).await.unwrap();
        let mut package = TransferPackage::for_files();
        package.rows.push(TransferRow::file("a.txt", b"alpha".to_vec(), None));
        let report =
            destination.transmit_transfer("dst/renamed.txt", &package, &TransferOptions::default(), &cancel).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.outcomes[0].path.as_deref(), Some("dst/renamed.txt"));

        package.rows.push(TransferRow::file("b.txt", b"bravo".to_vec(), None));
        let err = destination
            .transmit_transfer("dst/renamed.txt", &package, &TransferOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_transmit_respects_overwrite() {
        let destination = MemoryConnector::with_store("destination", Arc::new(MemoryStore::with_files([("dst/a.txt", "old")])));
        let cancel = CancellationToken::new();
        let mut package = TransferPackage::for_files();
        package.rows.push(TransferRow::file("a.txt", b"new".to_vec(), None));

        let report = destination.transmit_transfer("dst/", &package, &TransferOptions::default(), &cancel).await.unwrap();
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(&failed[0].status, RowStatus::Failed { reason } if reason.contains("dst/a.txt")));

        let options = TransferOptions { overwrite: true, ..Default::default() };
        let report = destination.transmit_transfer("dst/", &package, &options, &cancel).await.unwrap();
        assert_eq!(report.outcomes[0].status, RowStatus::Written);
        let read = destination.read("dst/a.txt", ReadOptions::default(), &cancel).await.unwrap();
        assert_eq!(read.content, b"new");
    }

    fn sales() -> Table {
        Table {
            columns: vec!["region".into(), "units".into()],
            rows: vec![
                vec!["north".into(), 12i64.into()],
                vec!["south".into(), 3i64.into()],
                vec!["east".into(), 40i64.into()],
            ],
        }
    }

    #[tokio::test]
    async fn test_prepare_table_shapes_rows() {
        let table = sales();
        let options = TransferOptions {
            query: QueryOptions { filter: Some("units > 5".into()), sort: Some("units desc".into()), ..Default::default() },
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let prepared = collect(Box::pin(prepare_table(&table, &options, &cancel))).await.unwrap();
        assert_eq!(prepared.package.columns, vec!["region", "units"]);
        assert_eq!(keys(&prepared.package), vec!["0", "1"]);
        assert!(prepared.package.rows.iter().all(TransferRow::is_tabular));
        assert_eq!(
            prepared.package.to_table().rows,
            vec![vec![Value::from("east"), Value::from(40i64)], vec![Value::from("north"), Value::from(12i64)]]
        );
    }

    #[tokio::test]
    async fn test_prepare_table_projects_columns() {
        let table = sales();
        let options = TransferOptions { query: QueryOptions { fields: Some("units".into()), ..Default::default() }, ..Default::default() };
        let cancel = CancellationToken::new();
        let prepared = collect(Box::pin(prepare_table(&table, &options, &cancel))).await.unwrap();
        assert_eq!(prepared.package.columns, vec!["units"]);
        assert_eq!(prepared.package.rows[2].items, Some(vec![Value::from(40i64)]));

        let bad = TransferOptions { query: QueryOptions { filter: Some("units >".into()), ..Default::default() }, ..Default::default() };
        let err = collect(Box::pin(prepare_table(&table, &bad, &cancel))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FilterExpression(_)));
    }

    #[test]
    fn test_tabular_rows_need_one_value_per_column() {
        let mut package = TransferPackage { columns: vec!["region".into(), "units".into()], rows: Vec::new() };
        package.rows.push(TransferRow::tabular("0", vec!["north".into(), 12i64.into()]));
        package.validate().unwrap();
        package.rows.push(TransferRow::tabular("1", vec!["south".into()]));
        let err = package.validate().unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidPackage("row `1` has 1 values for 2 columns".into()));
    }

    #[tokio::test]
    async fn test_file_connector_refuses_tabular_rows() {
        let destination = MemoryConnector::new("destination");
        let cancel = CancellationToken::new();
        destination.create("dst/", CreateOptions::default(), &cancel).await.unwrap();
        let package = TransferPackage { columns: vec!["region".into()], rows: vec![TransferRow::tabular("0", vec!["north".into()])] };
        let report = destination.transmit_transfer("dst/", &package, &TransferOptions::default(), &cancel).await.unwrap();
        assert!(matches!(&report.outcomes[0].status, RowStatus::Failed { reason } if reason.contains("tabular row `0`")));
        assert!(!destination.exist("dst/0/", &cancel).await.unwrap());
    }

    #[test]
    fn test_package_json() {
        let mut package = TransferPackage::for_files();
        package.rows.push(TransferRow::directory("docs/"));
        package.rows.push(TransferRow::file("docs/a.txt", b"alpha".to_vec(), Some("text/plain".into())));
        let json = serde_json::to_value(&package).unwrap();
        assert_eq!(json["rows"][0]["content"], serde_json::Value::Null);
        assert_eq!(json["rows"][1]["content"], "YWxwaGE=");
        assert_eq!(json["rows"][1]["contentType"], "text/plain");
        let decoded: TransferPackage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, package);
    }
}
