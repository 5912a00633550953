//! Common types for the journal router
//!
//! Centralizes type definitions to avoid duplication across modules.

pub use journal_core::{DocumentId, ShardName};

/// 1-based shard number within a journal
pub type ShardNumber = u64;

/// Number of the first shard
pub const FIRST_SHARD: ShardNumber = 1;

/// Separator between the journal name and the shard number
pub const SHARD_SEPARATOR: char = '-';
