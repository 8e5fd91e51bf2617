//! Configuration for ferry.
//!
//! Configuration is layered with [`figment`]: built-in defaults, then a
//! YAML/TOML/JSON file picked by its extension, then `FERRY_`-prefixed
//! environment variables. Nested keys in the environment are separated by a
//! double underscore, so `FERRY_TRANSFER__BUFFER=4` sets `transfer.buffer`.
//!
//! ```yaml
//! connectors:
//!   disk:
//!     type: storage/local
//!     specifications:
//!       root: /srv/ferry
//! transfer:
//!   streaming: true
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FERRY_";
const ENV_SPLIT: &str = "__";
const DEFAULT_BUFFER: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configured connector instances, by name.
    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorConfig>,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Registry type id, e.g. `storage/local`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub specifications: Specifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Overlap preparing and transmitting instead of collecting the whole
    /// package first.
    pub streaming: bool,
    /// Rows held between the two sides when streaming.
    pub buffer: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { streaming: false, buffer: DEFAULT_BUFFER }
    }
}

/// Connector-specific settings. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Specifications(BTreeMap<String, Value>);

impl Specifications {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, value)| value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A boolean setting, also accepting `"true"`/`"false"` text.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.get(key)?;
        value.to_bool().or_else(|| value.as_str()?.trim().parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every field in `required` must be present and non-empty: no blank
    /// text, empty list, empty table or null.
    pub fn validate(&self, required: &[&str]) -> Result<()> {
        for field in required {
            match self.get(field) {
                None => exn::bail!(ErrorKind::MissingSpecification(field.to_string())),
                Some(value) if is_blank(value) => exn::bail!(ErrorKind::EmptySpecification(field.to_string())),
                Some(_) => {},
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::String(_, text) => text.trim().is_empty(),
        Value::Array(_, items) => items.is_empty(),
        Value::Dict(_, dict) => dict.is_empty(),
        Value::Empty(..) => true,
        _ => false,
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Specifications {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), Value::from(value.into()))).collect())
    }
}

impl Config {
    /// Load defaults, the file at `path` and the environment, in that order.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.display().to_string()));
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match extension.as_str() {
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
        };
        let config = Self::extract(figment, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), connectors = config.connectors.len(), "loaded configuration");
        Ok(config)
    }

    /// Load from [`default_path`](Self::default_path) when that file exists,
    /// otherwise from defaults and the environment alone.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path()
            && path.is_file()
        {
            return Self::load(path);
        }
        Self::extract(Figment::from(Serialized::defaults(Config::default())), "environment")
    }

    /// The per-user configuration file, e.g. `~/.config/ferry/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ferry").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    pub fn connector(&self, name: &str) -> Result<&ConnectorConfig> {
        self.connectors.get(name).ok_or_else(|| exn::Exn::from(ErrorKind::UnknownConnector(name.to_string())))
    }

    fn extract(figment: Figment, source: &str) -> Result<Self> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SPLIT))
            .extract()
            .or_raise(|| ErrorKind::Invalid(source.to_string()))
    }
}
