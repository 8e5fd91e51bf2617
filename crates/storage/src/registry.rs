//! Explicit connector registry.
//!
//! Connector types are registered up front under a `namespace/name` type id,
//! together with the specification fields they can't be built without.
//! [`Registry::build`] turns a configured connector into a live
//! [`ConnectorHandle`].

use crate::connector::{Connector, LocalConnector, MemoryConnector, ReadOnlyConnector};
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use ferry_config::{ConnectorConfig, Specifications};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

pub type ConnectorHandle = Arc<dyn Connector>;

/// Builds a connector named by the first argument from its specifications.
/// Required fields have already been validated when this runs.
pub type Factory = Box<dyn Fn(&str, &Specifications) -> Result<ConnectorHandle> + Send + Sync>;

/// Specification flag that wraps any connector in a [`ReadOnlyConnector`].
pub const READ_ONLY: &str = "readonly";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    #[display("storage")]
    Storage,
    #[display("database")]
    Database,
    #[display("stream")]
    Stream,
}

/// A connector type id such as `storage/local`.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{namespace}/{name}")]
pub struct TypeId {
    pub namespace: Namespace,
    pub name: String,
}

impl TypeId {
    fn storage(name: &str) -> Self {
        Self { namespace: Namespace::Storage, name: name.to_string() }
    }
}

impl FromStr for TypeId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || exn::Exn::from(ErrorKind::Specification(format!("invalid connector type `{s}`")));
        let (namespace, name) = s.split_once('/').ok_or_else(invalid)?;
        let namespace = match namespace.to_ascii_lowercase().as_str() {
            "storage" => Namespace::Storage,
            "database" => Namespace::Database,
            "stream" => Namespace::Stream,
            _ => return Err(invalid()),
        };
        let name = name.to_ascii_lowercase();
        if name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self { namespace, name })
    }
}

struct Registration {
    required: Vec<String>,
    factory: Factory,
}

#[derive(Default)]
pub struct Registry {
    registrations: BTreeMap<TypeId, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in connector types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let memory: Factory = Box::new(|name, _| Ok(Arc::new(MemoryConnector::new(name)) as ConnectorHandle));
        let local: Factory = Box::new(|name, specifications| {
            // Presence was validated; only a non-text value gets here.
            let root = specifications
                .get_str("root")
                .ok_or_else(|| exn::Exn::from(ErrorKind::Specification("`root` must be a path".to_string())))?;
            Ok(Arc::new(LocalConnector::new(name, root)?) as ConnectorHandle)
        });
        registry.insert(TypeId::storage("memory"), &[], memory);
        registry.insert(TypeId::storage("local"), &["root"], local);
        registry
    }

    /// Register a connector type. Each type id can only be registered once.
    pub fn register(&mut self, kind: &str, required: &[&str], factory: Factory) -> Result<()> {
        let kind: TypeId = kind.parse()?;
        if self.registrations.contains_key(&kind) {
            exn::bail!(ErrorKind::AlreadyExists(kind.to_string()));
        }
        self.insert(kind, required, factory);
        Ok(())
    }

    fn insert(&mut self, kind: TypeId, required: &[&str], factory: Factory) {
        let required = required.iter().map(|field| field.to_string()).collect();
        self.registrations.insert(kind, Registration { required, factory });
    }

    pub fn kinds(&self) -> impl Iterator<Item = &TypeId> {
        self.registrations.keys()
    }

    /// Validate the specifications, construct the connector and initialize
    /// it. Nothing is constructed when validation fails.
    pub async fn build(&self, name: &str, config: &ConnectorConfig) -> Result<ConnectorHandle> {
        let kind: TypeId = config.kind.parse()?;
        let Some(registration) = self.registrations.get(&kind) else {
            exn::bail!(ErrorKind::NotSupported(format!("connector type `{kind}`")));
        };
        let required: Vec<&str> = registration.required.iter().map(String::as_str).collect();
        config.specifications.validate(&required).map_err(ErrorKind::specification)?;
        let mut connector = (registration.factory)(name, &config.specifications)?;
        if config.specifications.get_bool(READ_ONLY).unwrap_or(false) {
            connector = Arc::new(ReadOnlyConnector::new(connector));
        }
        connector.initialize().await?;
        tracing::info!(connector = name, kind = %kind, "connector ready");
        Ok(connector)
    }
}
