//! Transfers between ferry connectors.
//!
//! ```
//! use ferry_storage::{Connector, options::TransferOptions};
//! use ferry_transfer::{Coordinator, Mode};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(source: &dyn Connector, destination: &dyn Connector) -> ferry_transfer::error::Result<()> {
//! let coordinator = Coordinator::new(Mode::Streaming { buffer: 8 });
//! let report = coordinator
//!     .transfer(source, "bucket/docs/", destination, "archive/docs/", &TransferOptions::default(), &CancellationToken::new())
//!     .await?;
//! for failed in report.failed() {
//!     eprintln!("{} did not arrive: {:?}", failed.key, failed.status);
//! }
//! # Ok(())
//! # }
//! ```

mod coordinator;
pub mod error;
mod report;

pub use crate::coordinator::{Coordinator, Mode};
pub use crate::report::TransferReport;
