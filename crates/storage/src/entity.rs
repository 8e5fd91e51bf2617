use crate::path;
use ferry_filter::{Record, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// Length of the hex identifier derived from a path.
const ID_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    File,
    Directory,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::File => "file",
            Self::Directory => "directory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    String(String),
}

impl From<&MetadataValue> for Value {
    fn from(value: &MetadataValue) -> Self {
        match value {
            MetadataValue::Bool(b) => Value::Bool(*b),
            MetadataValue::String(s) => Value::String(s.clone()),
        }
    }
}

/// A file or directory as reported by a connector.
///
/// Built fresh by every call; the core never keeps them around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntity {
    pub id: String,
    /// Normalized path including the container. Directories end in `/`.
    pub full_path: String,
    pub name: String,
    pub kind: EntityKind,
    pub size: Option<u64>,
    /// Only set when the backend has a digest at hand.
    pub hash: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified: Option<OffsetDateTime>,
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl StorageEntity {
    /// A file entity. `full_path` must already be normalized and must not
    /// end in a separator.
    pub fn file(full_path: impl Into<String>, size: u64) -> Self {
        let full_path = full_path.into();
        debug_assert!(path::is_file(&full_path), "file entity with directory path {full_path}");
        let content_type = Some(content_type_for(&full_path).to_string());
        Self { size: Some(size), content_type, ..Self::base(full_path, EntityKind::File) }
    }

    /// A directory entity. A missing trailing separator is added.
    pub fn directory(full_path: impl Into<String>) -> Self {
        let mut full_path = full_path.into();
        if !full_path.ends_with(path::SEPARATOR) {
            full_path.push(path::SEPARATOR);
        }
        Self::base(full_path, EntityKind::Directory)
    }

    fn base(full_path: String, kind: EntityKind) -> Self {
        Self {
            id: path_id(&full_path),
            name: path::name(&full_path).to_string(),
            full_path,
            kind,
            size: None,
            hash: None,
            created: None,
            modified: None,
            content_type: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_times(mut self, created: Option<OffsetDateTime>, modified: Option<OffsetDateTime>) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntityKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntityKind::Directory
    }
}

/// Stable identifier for a path: the leading hex digits of its BLAKE3 digest.
pub fn path_id(full_path: &str) -> String {
    blake3::hash(full_path.as_bytes()).to_hex().as_str()[..ID_LENGTH].to_string()
}

/// Content digest used wherever a connector hashes file bodies itself.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Guess a MIME type from the file extension.
pub fn content_type_for(full_path: &str) -> &'static str {
    let extension = path::name(full_path).rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("md") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("yaml" | "yml") => "application/yaml",
        Some("toml") => "application/toml",
        Some("js") => "text/javascript",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("bz2") => "application/x-bzip2",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Summarize a byte count in binary units: `512 B`, `1.5 KiB`, `3 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{bytes} B");
    }
    let rounded = format!("{value:.1}");
    let rounded = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{rounded} {}", UNITS[unit])
}

const COLUMNS: [&str; 9] = ["id", "name", "path", "kind", "size", "hash", "createdTime", "modifiedTime", "contentType"];
const METADATA_PREFIX: &str = "metadata.";

impl Record for StorageEntity {
    fn field(&self, name: &str) -> Option<Value> {
        let lowered = name.to_ascii_lowercase();
        if let Some(key) = lowered.strip_prefix(METADATA_PREFIX) {
            // Metadata is only populated on request, so a missing key is
            // null rather than an unknown field.
            let value = self.metadata.iter().find(|(k, _)| k.to_ascii_lowercase() == key).map(|(_, v)| v.into());
            return Some(value.unwrap_or_default());
        }
        let value = match lowered.as_str() {
            "id" => Value::from(self.id.as_str()),
            "name" => Value::from(self.name.as_str()),
            "path" | "fullpath" => Value::from(self.full_path.as_str()),
            "kind" => Value::from(self.kind.to_string()),
            "size" => Value::from(self.size),
            "hash" | "md5" => Value::from(self.hash.clone()),
            "createdtime" | "created" => Value::from(self.created),
            "modifiedtime" | "modified" => Value::from(self.modified),
            "contenttype" => Value::from(self.content_type.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.metadata.keys().map(|key| format!("{METADATA_PREFIX}{key}")));
        columns
    }

    fn identity(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.full_path)
    }
}
