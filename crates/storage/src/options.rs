//! Caller-supplied options for connector operations.
//!
//! All of these deserialize from the external camelCase schema, with every
//! field optional.

use crate::error::{ErrorKind, Result};
use ferry_filter::{FilterEngine, FilterSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// Projected fields: comma separated, or a JSON array.
    pub fields: Option<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub case_sensitive: bool,
    /// Maximum number of results, parsed when the query runs.
    pub limit: Option<String>,
    pub offset: Option<usize>,
    pub include_metadata: bool,
    pub recurse: bool,
    /// Render raw byte counts instead of summarized sizes.
    pub full: bool,
}

impl QueryOptions {
    pub fn recursive() -> Self {
        Self { recurse: true, ..Self::default() }
    }

    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            fields: self.fields.clone(),
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            case_sensitive: self.case_sensitive,
            limit: self.limit.clone(),
            offset: self.offset,
        }
    }

    /// Parse every clause, failing before any backend call is made.
    pub fn engine(&self) -> Result<FilterEngine> {
        FilterEngine::new(&self.filter_spec()).map_err(ErrorKind::filter)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    /// `Some(false)` makes creating an existing directory an error.
    pub overwrite: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadOptions {
    /// Compute a content hash when the backend doesn't have one.
    pub hashing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteOptions {
    #[serde(flatten)]
    pub query: QueryOptions,
    /// Also remove the directory itself and everything below it.
    pub purge: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    /// Every matched file in one archive.
    #[default]
    Zip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressOptions {
    #[serde(flatten)]
    pub query: QueryOptions,
    pub compression: Compression,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferOptions {
    #[serde(flatten)]
    pub query: QueryOptions,
    /// Overwrite existing files at the destination.
    pub overwrite: bool,
}
