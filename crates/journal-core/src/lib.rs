//! Journal Core - Shared library for sharded journals
//!
//! This crate provides the pieces every journal instance shares:
//! the backing store contract, the persisted shard metadata record,
//! configuration, and an in-process store implementation.

pub mod config;
pub mod memory;
pub mod shard;
pub mod store;

pub use config::{ConfigError, JournalConfig, DEFAULT_REFRESH_PERIOD};
pub use memory::MemoryStore;
pub use shard::{settings_collection_name, ShardMetadata, ShardName, METADATA_RECORD_ID};
pub use store::{
    BackingStore, Document, DocumentId, FindQuery, IndexSpec, StoreError, StoreResult, ID_FIELD,
};
