//! Moving a subtree from one connector to another.
//!
//! The source prepares rows, the destination transmits them. In
//! [`Mode::TwoPhase`] the whole package is prepared before anything is
//! written. In [`Mode::Streaming`] rows flow over a bounded channel and are
//! written while the source is still reading, so at most `buffer` rows of
//! content are held in memory at once. Both modes write rows in the order the
//! source listed them.

use crate::error::{ErrorKind, Result};
use crate::report::TransferReport;
use ferry_config::TransferConfig;
use ferry_storage::error::ErrorKind as StorageErrorKind;
use ferry_storage::options::TransferOptions;
use ferry_storage::transfer::{self, PrepareItem, RowFailure, RowOutcome, Step};
use ferry_storage::{Connector, path};
use futures::StreamExt;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    TwoPhase,
    Streaming { buffer: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    mode: Mode,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl Coordinator {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        match config.streaming {
            true => Self::new(Mode::Streaming { buffer: config.buffer }),
            false => Self::new(Mode::TwoPhase),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Copy `from` on `source` to `to` on `destination`.
    ///
    /// Only problems with the transfer as a whole are errors: an invalid
    /// path on either side, a failed source listing or a malformed package.
    /// Rows that fail are reported and the transfer carries on.
    ///
    /// When streaming, such a problem can show up after some rows have
    /// already arrived. The report is returned then, with
    /// [`aborted`](TransferReport::aborted) set, so those rows are not lost
    /// from view.
    #[instrument(skip_all, fields(source = source.name(), destination = destination.name(), from = %from, to = %to, mode = ?self.mode))]
    pub async fn transfer(
        &self,
        source: &dyn Connector,
        from: &str,
        destination: &dyn Connector,
        to: &str,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let report = match self.mode {
            Mode::TwoPhase => two_phase(source, from, destination, to, options, cancel).await?,
            Mode::Streaming { buffer } => streaming(source, from, destination, to, options, cancel, buffer).await?,
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed().count(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            "transfer finished"
        );
        Ok(report)
    }
}

async fn two_phase(
    source: &dyn Connector,
    from: &str,
    destination: &dyn Connector,
    to: &str,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    let prepared = source
        .prepare_transfer(from, options, cancel)
        .await
        .map_err(|err| ErrorKind::prepare(source, from, err))?;
    tracing::debug!(rows = prepared.package.len(), skipped = prepared.failures.len(), "prepared package");
    let mut report = TransferReport { skipped: prepared.failures, ..TransferReport::default() };
    if prepared.cancelled {
        report.cancelled = true;
        return Ok(report);
    }
    let transmitted = destination
        .transmit_transfer(to, &prepared.package, options, cancel)
        .await
        .map_err(|err| ErrorKind::transmit(destination, to, err))?;
    report.outcomes = transmitted.outcomes;
    report.cancelled = transmitted.cancelled;
    Ok(report)
}

async fn streaming(
    source: &dyn Connector,
    from: &str,
    destination: &dyn Connector,
    to: &str,
    options: &TransferOptions,
    cancel: &CancellationToken,
    buffer: usize,
) -> Result<TransferReport> {
    let target = path::normalize(to).map_err(|err| ErrorKind::transmit(destination, to, err))?;
    let (sender, mut receiver) = mpsc::channel::<PrepareItem>(buffer.max(1));

    let producer = async move {
        let mut rows = source.prepare_stream(from, options, cancel);
        let mut skipped = Vec::new();
        let mut cancelled = false;
        while let Some(item) = rows.next().await {
            let item = match transfer::classify(item) {
                Ok(Step::Columns(columns)) => PrepareItem::Columns(columns),
                Ok(Step::Row(row)) => PrepareItem::Row(row),
                Ok(Step::Failed(failure)) => {
                    skipped.push(failure);
                    continue;
                },
                Ok(Step::Cancelled) => {
                    cancelled = true;
                    break;
                },
                Err(err) => return Produced { skipped, cancelled, fatal: Some(ErrorKind::prepare(source, from, err)) },
            };
            // The consumer only hangs up when it has stopped for good.
            if sender.send(item).await.is_err() {
                break;
            }
        }
        Produced { skipped, cancelled, fatal: None }
    };

    let consumer = async move {
        let mut consumed = Consumed::default();
        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        while let Some(item) = receiver.recv().await {
            let row = match item {
                PrepareItem::Columns(header) => {
                    columns = header;
                    continue;
                },
                PrepareItem::Row(row) => row,
            };
            let refused = if !seen.insert(row.key.clone()) {
                Some(StorageErrorKind::InvalidPackage(format!("duplicate row key `{}`", row.key)))
            } else if path::is_file(&target) && !consumed.outcomes.is_empty() {
                Some(StorageErrorKind::NotADirectory(target.clone()))
            } else {
                transfer::check_row(&columns, &row).err().map(|err| (*err).clone())
            };
            if let Some(cause) = refused {
                let connector = destination.name().to_string();
                consumed.fatal = Some(exn::Exn::from(ErrorKind::Transmit { connector, path: target.clone(), cause }));
                break;
            }
            if cancel.is_cancelled() {
                consumed.cancelled = true;
                break;
            }
            consumed.outcomes.push(transfer::outcome(destination, &target, &columns, &row, options, cancel).await);
        }
        consumed
    };

    let (produced, consumed) = futures::join!(producer, consumer);
    let report = TransferReport {
        skipped: produced.skipped,
        outcomes: consumed.outcomes,
        cancelled: produced.cancelled || consumed.cancelled,
        aborted: None,
    };
    match produced.fatal.or(consumed.fatal) {
        None => Ok(report),
        // Nothing arrived, so the transfer simply failed.
        Some(err) if report.succeeded() == 0 => Err(err),
        Some(err) => {
            tracing::warn!(succeeded = report.succeeded(), error = %*err, "transfer aborted after rows were written");
            Ok(TransferReport { aborted: Some((*err).to_string()), ..report })
        },
    }
}

struct Produced {
    skipped: Vec<RowFailure>,
    cancelled: bool,
    fatal: Option<crate::error::Error>,
}

#[derive(Default)]
struct Consumed {
    outcomes: Vec<RowOutcome>,
    cancelled: bool,
    fatal: Option<crate::error::Error>,
}
