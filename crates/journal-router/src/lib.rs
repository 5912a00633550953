//! Journal Router - Identifier-partitioned shard routing
//!
//! Presents one logical collection over an unbounded number of physical
//! shards, each holding a fixed span of a monotonically increasing id.
//!
//! # Architecture
//!
//! ```text
//! insert / find / update
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │   JournalCollection     │  Which shard(s)?
//! │   (namer + registry)    │
//! └───────────┬─────────────┘
//!             │
//!     ┌───────┴────────┐
//!     ▼                ▼
//! ┌──────────┐   ┌───────────────┐
//! │ShardQuery│   │  FanOutQuery  │  newest shard first, global skip/limit
//! └────┬─────┘   └───────┬───────┘
//!      └────────┬────────┘
//!               ▼
//! ┌─────────────────────────┐
//! │     BackingStore        │  external document store
//! └─────────────────────────┘
//! ```
//!
//! Shard list growth is asynchronous: inserts queue a reconcile task and
//! return without waiting for it. Read-only instances pick up shards created
//! by writers on a periodic refresh.
//!
//! # Example
//!
//! ```rust,ignore
//! use journal_core::{JournalConfig, MemoryStore};
//! use journal_router::JournalCollection;
//!
//! let store = Arc::new(MemoryStore::new());
//! let players = JournalCollection::create(JournalConfig::new("players", 10), store).await?;
//!
//! players.insert(24, &json!({ "login": "alice" })).await?;
//! players.flush_reconciliation().await?;
//!
//! let latest: Vec<Player> = players.find(json!({})).sort("-_id").limit(3).fetch_all().await?;
//! ```

// Core modules
mod error;
mod types;
mod namer;

// Shard list
mod registry;
mod reconcile;

// Routing and queries
mod collection;
mod query;

// Re-exports: Error types
pub use error::{JournalError, Result};

// Re-exports: Core types
pub use types::{DocumentId, ShardName, ShardNumber, FIRST_SHARD, SHARD_SEPARATOR};

// Re-exports: Shard naming
pub use namer::{parse_shard_number, shard_name, shard_name_for_number, shard_number};

// Re-exports: Shard registry
pub use registry::{MetadataStore, ShardRegistry, Synchronized};

// Re-exports: Router and queries
pub use collection::JournalCollection;
pub use query::{FanOutQuery, ShardQuery};
