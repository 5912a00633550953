//! Shard naming
//!
//! Maps a document identifier to the shard that holds it. The mapping is a
//! pure function of `(id, interval)`: no registry lookup is needed to know
//! where a document lives, only to know whether that shard exists yet.
//!
//! ```text
//! interval = 10
//!
//!   ids 0..=9    → players-1
//!   ids 10..=19  → players-2
//!   ids 20..=29  → players-3
//! ```

use crate::types::{DocumentId, ShardName, ShardNumber, FIRST_SHARD, SHARD_SEPARATOR};

/// Shard number holding `id`
///
/// `interval` must be non-zero; configurations are validated before any
/// routing happens. Saturates at `u64::MAX` for `interval == 1`.
pub fn shard_number(id: DocumentId, interval: u64) -> ShardNumber {
    (id / interval).saturating_add(FIRST_SHARD)
}

/// Name of the shard with the given number
pub fn shard_name_for_number(base: &str, number: ShardNumber) -> ShardName {
    format!("{}{}{}", base, SHARD_SEPARATOR, number)
}

/// Name of the shard holding `id`
pub fn shard_name(base: &str, id: DocumentId, interval: u64) -> ShardName {
    shard_name_for_number(base, shard_number(id, interval))
}

/// Shard number encoded in a shard name of journal `base`
///
/// `None` for names that do not belong to `base` or carry no number.
pub fn parse_shard_number(base: &str, shard: &str) -> Option<ShardNumber> {
    shard
        .strip_prefix(base)?
        .strip_prefix(SHARD_SEPARATOR)?
        .parse()
        .ok()
}
