//! Uniform storage model for ferry.
//!
//! Every backend is reached through a [`Connector`], addressed with canonical
//! [`path`]s, and lists [`StorageEntity`] values that can be filtered, sorted
//! and paged with [`QueryOptions`](options::QueryOptions). Two connectors
//! that know nothing about each other can exchange a subtree through a
//! [`TransferPackage`].

mod archive;
pub mod connector;
pub mod entity;
pub mod error;
pub mod options;
pub mod path;
pub mod registry;
pub mod transfer;

pub use crate::archive::CompressEntry;
pub use crate::connector::{
    Connector, LocalConnector, MemoryConnector, MemoryStore, ReadOnlyConnector, ReadResult, StorageUsage,
};
pub use crate::entity::{EntityKind, MetadataValue, StorageEntity};
pub use crate::registry::{ConnectorHandle, Registry};
pub use crate::transfer::{PrepareItem, Prepared, RowOutcome, RowStatus, TransferPackage, TransferRow, TransmitReport};
