use ferry_storage::transfer::{RowFailure, RowOutcome};
use serde::{Deserialize, Serialize};

/// Everything that happened during one transfer.
///
/// Rows are never rolled back: whatever made it to the destination before a
/// failure or cancellation stays there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    /// Rows the source could not prepare. These never reached the destination.
    pub skipped: Vec<RowFailure>,
    /// One outcome per row the destination attempted, in order.
    pub outcomes: Vec<RowOutcome>,
    pub cancelled: bool,
    /// The error that stopped a streaming transfer after some rows had
    /// already arrived.
    pub aborted: Option<String>,
}

impl TransferReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Every prepared row was transmitted and nothing was skipped.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.aborted.is_none() && self.skipped.is_empty() && self.outcomes.iter().all(RowOutcome::is_success)
    }
}
