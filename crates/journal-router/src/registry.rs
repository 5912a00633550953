//! Shard registry
//!
//! In-memory copy of a journal's shard metadata record, plus the small
//! persistence layer that loads and saves that record in the
//! `{base}-settings` collection.
//!
//! All access to the cached record goes through [`Synchronized`], whose
//! closures make the extent of every critical section visible at the call
//! site. No store call ever happens inside one.

use std::sync::Arc;

use journal_core::{
    settings_collection_name, BackingStore, FindQuery, ShardMetadata, StoreError,
    METADATA_RECORD_ID,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{JournalError, Result};
use crate::types::ShardName;

/// Value guarded by a mutex, reachable only through scoped closures
#[derive(Debug, Default)]
pub struct Synchronized<T> {
    inner: Mutex<T>,
}

impl<T> Synchronized<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    /// Run `f` with shared access
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock();
        f(&guard)
    }

    /// Run `f` with exclusive access
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

/// Cached list of known shards for one journal
#[derive(Debug)]
pub struct ShardRegistry {
    metadata: Synchronized<ShardMetadata>,
}

impl ShardRegistry {
    /// Build from a loaded record, repairing a broken reverse list
    pub fn new(record: ShardMetadata) -> Self {
        let mut metadata = ShardMetadata::empty();
        metadata.absorb(record);
        Self {
            metadata: Synchronized::new(metadata),
        }
    }

    /// Shards newest-first
    pub fn snapshot_descending(&self) -> Vec<ShardName> {
        self.metadata.read(|m| m.shards_descending.clone())
    }

    /// Shards in discovery order
    pub fn snapshot_ascending(&self) -> Vec<ShardName> {
        self.metadata.read(|m| m.shards_ascending.clone())
    }

    /// Copy of the whole record
    pub fn snapshot(&self) -> ShardMetadata {
        self.metadata.read(|m| m.clone())
    }

    /// Most recently registered shard
    pub fn newest(&self) -> Option<ShardName> {
        self.metadata.read(|m| m.shards_ascending.last().cloned())
    }

    pub fn known_count(&self) -> usize {
        self.metadata.read(ShardMetadata::len)
    }

    pub fn contains(&self, shard: &str) -> bool {
        self.metadata.read(|m| m.contains(shard))
    }

    /// Append a shard. Returns the record to persist when the shard is new.
    pub fn register(&self, shard: ShardName) -> Option<ShardMetadata> {
        self.metadata.update(|m| m.append(shard).then(|| m.clone()))
    }

    /// Merge a record loaded from the store; returns how many shards were new
    pub fn absorb(&self, loaded: ShardMetadata) -> usize {
        self.metadata.update(|m| m.absorb(loaded))
    }
}

/// Loads and saves the metadata record of one journal
#[derive(Clone)]
pub struct MetadataStore {
    store: Arc<dyn BackingStore>,
    collection: String,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn BackingStore>, base: &str) -> Self {
        Self {
            store,
            collection: settings_collection_name(base),
        }
    }

    /// Name of the settings collection
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Read the record; `None` when it was never written
    pub async fn load(&self) -> Result<Option<ShardMetadata>> {
        let query = FindQuery::by_id(METADATA_RECORD_ID);
        match self.store.find_one(&self.collection, &query).await {
            Ok(doc) => {
                let record = serde_json::from_value(doc).map_err(|source| JournalError::Decode {
                    shard: self.collection.clone(),
                    source,
                })?;
                Ok(Some(record))
            }
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Upsert the whole record under its fixed id
    pub async fn persist(&self, record: &ShardMetadata) -> Result<()> {
        let doc = serde_json::to_value(record)
            .map_err(|e| JournalError::InvalidDocument(e.to_string()))?;
        self.store
            .upsert_by_id(&self.collection, METADATA_RECORD_ID, &doc)
            .await?;
        debug!(
            collection = %self.collection,
            shards = record.len(),
            "Shard metadata persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_core::MemoryStore;
    use serde_json::json;
    use tokio_test::block_on;

    #[test]
    fn test_synchronized_scoped_access() {
        let value = Synchronized::new(vec![1, 2]);
        value.update(|v| v.push(3));
        assert_eq!(value.read(|v| v.len()), 3);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ShardRegistry::new(ShardMetadata::empty());

        let first = registry.register("players-1".to_string());
        assert!(first.is_some());
        assert!(registry.register("players-1".to_string()).is_none());
        assert_eq!(registry.known_count(), 1);
    }

    #[test]
    fn test_descending_is_reverse() {
        let registry = ShardRegistry::new(ShardMetadata::empty());
        for n in 1..=4 {
            registry.register(format!("players-{}", n));
        }
        let mut ascending = registry.snapshot_ascending();
        ascending.reverse();
        assert_eq!(registry.snapshot_descending(), ascending);
        assert!(registry.snapshot().is_consistent());
        assert_eq!(registry.newest().as_deref(), Some("players-4"));
    }

    #[test]
    fn test_concurrent_register() {
        let registry = Arc::new(ShardRegistry::new(ShardMetadata::empty()));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for n in 1..=20 {
                        registry.register(format!("players-{}", n));
                    }
                });
            }
        });

        let ascending = registry.snapshot_ascending();
        assert_eq!(ascending.len(), 20);
        let mut deduped = ascending.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 20);
        assert!(registry.snapshot().is_consistent());
    }

    #[test]
    fn test_new_repairs_record() {
        let record = ShardMetadata {
            id: METADATA_RECORD_ID,
            shards_ascending: vec!["p-1".to_string(), "p-2".to_string()],
            shards_descending: vec![],
        };
        let registry = ShardRegistry::new(record);
        assert_eq!(registry.snapshot_descending(), vec!["p-2", "p-1"]);
    }

    #[test]
    fn test_metadata_store_load_and_persist() {
        let store = Arc::new(MemoryStore::new());
        let metadata = MetadataStore::new(store.clone(), "players");
        assert_eq!(metadata.collection(), "players-settings");

        assert_eq!(block_on(metadata.load()).unwrap(), None);

        let mut record = ShardMetadata::empty();
        record.append("players-1".to_string());
        block_on(metadata.persist(&record)).unwrap();
        record.append("players-2".to_string());
        block_on(metadata.persist(&record)).unwrap();

        assert_eq!(block_on(metadata.load()).unwrap(), Some(record));
        assert_eq!(store.documents("players-settings").len(), 1);
    }

    #[test]
    fn test_metadata_store_rejects_garbage() {
        let store = Arc::new(MemoryStore::new());
        block_on(store.insert("players-settings", json!({ "_id": 1, "collectionsList": 5 }))).unwrap();

        let metadata = MetadataStore::new(store, "players");
        let result = block_on(metadata.load());
        assert!(matches!(result, Err(JournalError::Decode { .. })));
    }
}
