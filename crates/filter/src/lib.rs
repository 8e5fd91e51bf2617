//! Filtering, sorting, paging and projection over records.
//!
//! The same pipeline shapes storage listings and tabular row data. Callers
//! implement [`Record`] for their own types and hand a [`FilterSpec`] to
//! [`FilterEngine::new`].

mod engine;
pub mod error;
pub mod expr;
mod record;
mod sort;
mod table;
mod value;

pub use crate::engine::{FilterEngine, FilterSpec};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::expr::Expr;
pub use crate::record::Record;
pub use crate::sort::SortKey;
pub use crate::table::{Table, TableRow};
pub use crate::value::{Value, parse_timestamp};
