//! Shard metadata record
//!
//! One record per logical collection, stored in `{base}-settings` under a
//! fixed `_id`. It lists every shard the journal has discovered, both in
//! discovery order and newest-first.

use serde::{Deserialize, Serialize};

/// Physical shard (collection) name
pub type ShardName = String;

/// Fixed `_id` of the metadata record
pub const METADATA_RECORD_ID: u64 = 1;

/// Suffix of the collection holding the metadata record
pub const SETTINGS_SUFFIX: &str = "settings";

/// Name of the metadata collection for a logical collection
pub fn settings_collection_name(base: &str) -> String {
    format!("{}-{}", base, SETTINGS_SUFFIX)
}

/// Persisted list of known shards
///
/// Both lists are append-only and `shards_descending` is always the exact
/// reverse of `shards_ascending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMetadata {
    #[serde(rename = "_id")]
    pub id: u64,

    /// Shards in discovery order
    #[serde(rename = "collectionsList", default)]
    pub shards_ascending: Vec<ShardName>,

    /// Shards newest-first
    #[serde(rename = "reverseCollectionsList", default)]
    pub shards_descending: Vec<ShardName>,
}

impl ShardMetadata {
    /// Record of a journal with no shards yet
    pub fn empty() -> Self {
        Self {
            id: METADATA_RECORD_ID,
            shards_ascending: Vec::new(),
            shards_descending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.shards_ascending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards_ascending.is_empty()
    }

    pub fn contains(&self, shard: &str) -> bool {
        self.shards_ascending.iter().any(|s| s == shard)
    }

    /// Append a newly discovered shard. Returns false if it was already known.
    pub fn append(&mut self, shard: ShardName) -> bool {
        if self.contains(&shard) {
            return false;
        }
        self.shards_ascending.push(shard);
        self.rebuild_descending();
        true
    }

    /// Merge a freshly loaded record into this one
    ///
    /// Shards unknown here are appended in the order the loaded record lists
    /// them, so a stale or diverging copy can never shrink or reorder the
    /// list. Returns the number of shards added.
    pub fn absorb(&mut self, loaded: ShardMetadata) -> usize {
        let mut added = 0;
        for shard in loaded.shards_ascending {
            if !self.contains(&shard) {
                self.shards_ascending.push(shard);
                added += 1;
            }
        }
        if added > 0 || !self.is_consistent() {
            self.rebuild_descending();
        }
        added
    }

    /// Check the reverse invariant
    pub fn is_consistent(&self) -> bool {
        self.shards_ascending.len() == self.shards_descending.len()
            && self
                .shards_ascending
                .iter()
                .rev()
                .eq(self.shards_descending.iter())
    }

    fn rebuild_descending(&mut self) {
        self.shards_descending = self.shards_ascending.iter().rev().cloned().collect();
    }
}

impl Default for ShardMetadata {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_record() {
        let record = ShardMetadata::empty();
        assert_eq!(record.id, METADATA_RECORD_ID);
        assert!(record.is_empty());
        assert!(record.is_consistent());
    }

    #[test]
    fn test_append_keeps_reverse() {
        let mut record = ShardMetadata::empty();
        assert!(record.append("players-1".to_string()));
        assert!(record.append("players-2".to_string()));
        assert!(record.append("players-3".to_string()));

        assert_eq!(record.shards_ascending, vec!["players-1", "players-2", "players-3"]);
        assert_eq!(record.shards_descending, vec!["players-3", "players-2", "players-1"]);
        assert!(record.is_consistent());
    }

    #[test]
    fn test_append_duplicate_is_noop() {
        let mut record = ShardMetadata::empty();
        assert!(record.append("players-1".to_string()));
        assert!(!record.append("players-1".to_string()));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_absorb_extends_prefix() {
        let mut record = ShardMetadata::empty();
        record.append("players-1".to_string());

        let mut loaded = record.clone();
        loaded.append("players-2".to_string());

        assert_eq!(record.absorb(loaded), 1);
        assert_eq!(record.shards_descending, vec!["players-2", "players-1"]);
    }

    #[test]
    fn test_absorb_never_shrinks() {
        let mut record = ShardMetadata::empty();
        record.append("players-1".to_string());
        record.append("players-2".to_string());

        // A stale copy that only knows the first shard
        let mut stale = ShardMetadata::empty();
        stale.append("players-1".to_string());

        assert_eq!(record.absorb(stale), 0);
        assert_eq!(record.shards_ascending, vec!["players-1", "players-2"]);
    }

    #[test]
    fn test_absorb_repairs_reverse_list() {
        let mut record = ShardMetadata {
            id: METADATA_RECORD_ID,
            shards_ascending: vec!["players-1".to_string(), "players-2".to_string()],
            shards_descending: vec![],
        };
        assert!(!record.is_consistent());
        record.absorb(ShardMetadata::empty());
        assert!(record.is_consistent());
    }

    #[test]
    fn test_serialized_layout() {
        let mut record = ShardMetadata::empty();
        record.append("players-1".to_string());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": 1,
                "collectionsList": ["players-1"],
                "reverseCollectionsList": ["players-1"],
            })
        );

        let decoded: ShardMetadata = serde_json::from_value(json!({ "_id": 1 })).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_settings_collection_name() {
        assert_eq!(settings_collection_name("players"), "players-settings");
    }
}
