//! Journal collection
//!
//! The public entry point: one logical collection spread over many physical
//! shards, each covering a fixed span of document ids.
//!
//! # Operation routing
//!
//! ```text
//!                    ┌──────────────────────────┐
//!  insert(id) ──────►│ shard_name(id)           │──► store.insert ──► enqueue reconcile
//!  find_by_id(id) ──►│ (pure, no registry)      │──► ShardQuery
//!  update_by_id ────►│                          │──► store.update_by_id
//!  upsert_by_id ────►│                          │──► store.upsert_by_id ──► enqueue reconcile
//!                    └──────────────────────────┘
//!                    ┌──────────────────────────┐
//!  find(filter) ────►│ registry snapshot        │──► FanOutQuery (newest shard first)
//!  update ──────────►│ (shards newest-first)    │──► broadcast to every shard
//!  update_all ──────►│                          │
//!                    └──────────────────────────┘
//! ```
//!
//! Broadcast writes succeed when at least one shard accepted the write; the
//! last shard error is reported only when every shard failed.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::future::join_all;
use journal_core::{
    BackingStore, FindQuery, JournalConfig, ShardMetadata, StoreError, StoreResult, ID_FIELD,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{JournalError, Result};
use crate::namer;
use crate::query::{FanOutQuery, ShardQuery};
use crate::reconcile::{spawn_reconciler, spawn_refresher, ReconcileTask};
use crate::registry::{MetadataStore, ShardRegistry, Synchronized};
use crate::types::{DocumentId, ShardName};

/// State shared with the background tasks
pub(crate) struct JournalInner {
    pub(crate) config: JournalConfig,
    pub(crate) store: Arc<dyn BackingStore>,
    pub(crate) registry: ShardRegistry,
    pub(crate) metadata: MetadataStore,
    /// Serializes shard-list maintenance (reconcile and refresh)
    pub(crate) gate: tokio::sync::Mutex<()>,
    /// Set when the last metadata upsert failed
    pub(crate) persist_pending: AtomicBool,
    /// Shards whose indexes were all ensured by this instance
    indexed: Synchronized<HashSet<ShardName>>,
}

/// A logical collection partitioned by id ranges
pub struct JournalCollection {
    inner: Arc<JournalInner>,
    reconcile_tx: mpsc::UnboundedSender<ReconcileTask>,
    refresh_shutdown: Option<mpsc::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl JournalCollection {
    /// Open a journal
    ///
    /// Validates the configuration, loads the shard metadata record (a
    /// missing or unreadable record starts an empty journal) and starts the
    /// reconcile worker. Read-only instances also start the periodic
    /// refresh. Must be called within a tokio runtime.
    pub async fn create(config: JournalConfig, store: Arc<dyn BackingStore>) -> Result<Self> {
        config.validate()?;

        let metadata = MetadataStore::new(store.clone(), &config.name);
        let record = match metadata.load().await {
            Ok(Some(record)) => record,
            Ok(None) => ShardMetadata::empty(),
            Err(err) => {
                warn!(
                    journal = %config.name,
                    error = %err,
                    "Failed to load shard metadata, starting with an empty shard list"
                );
                ShardMetadata::empty()
            }
        };

        info!(
            journal = %config.name,
            instance = %config.instance_id,
            interval = config.interval,
            shards = record.len(),
            read_only = config.read_only,
            "Creating journal"
        );

        let inner = Arc::new(JournalInner {
            registry: ShardRegistry::new(record),
            metadata,
            store,
            gate: tokio::sync::Mutex::new(()),
            persist_pending: AtomicBool::new(false),
            indexed: Synchronized::new(HashSet::new()),
            config,
        });

        let (reconcile_tx, reconcile_rx) = mpsc::unbounded_channel();
        let mut tasks = vec![spawn_reconciler(inner.clone(), reconcile_rx)];

        let refresh_shutdown = if inner.config.read_only {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let period = inner.config.refresh_period;
            tasks.push(spawn_refresher(inner.clone(), period, shutdown_rx));
            info!(
                journal = %inner.config.name,
                period_secs = period.as_secs_f64(),
                "Read-only mode, refreshing shard list periodically"
            );
            Some(shutdown_tx)
        } else {
            None
        };

        Ok(Self {
            inner,
            reconcile_tx,
            refresh_shutdown,
            tasks,
        })
    }

    /// Logical collection name
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Id span covered by one shard
    pub fn interval(&self) -> u64 {
        self.inner.config.interval
    }

    pub fn config(&self) -> &JournalConfig {
        &self.inner.config
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.config.read_only
    }

    /// Shard that holds (or would hold) `id`
    pub fn shard_name(&self, id: DocumentId) -> ShardName {
        namer::shard_name(&self.inner.config.name, id, self.inner.config.interval)
    }

    /// Known shards in discovery order
    pub fn shards(&self) -> Vec<ShardName> {
        self.inner.registry.snapshot_ascending()
    }

    /// Insert a document with the given id
    ///
    /// The document must serialize to an object; `_id` is set to `id` when
    /// absent. Returns the store's write error verbatim. On success the
    /// shard list update is queued and not awaited.
    pub async fn insert<T: Serialize + ?Sized>(&self, id: DocumentId, document: &T) -> Result<()> {
        let mut doc = serde_json::to_value(document)
            .map_err(|e| JournalError::InvalidDocument(e.to_string()))?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(JournalError::InvalidDocument(
                "document must serialize to an object".to_string(),
            ));
        };
        fields.entry(ID_FIELD).or_insert_with(|| Value::from(id));

        let shard = self.shard_name(id);
        self.ensure_indexes(&shard).await;
        self.inner.store.insert(&shard, doc).await?;
        trace!(journal = %self.name(), shard = %shard, id, "Document inserted");

        self.enqueue_reconcile(id);
        Ok(())
    }

    /// Query the single shard implied by `id`
    pub fn find_by_id(&self, id: DocumentId) -> ShardQuery {
        ShardQuery::new(self.inner.store.clone(), self.shard_name(id), FindQuery::by_id(id))
    }

    /// Query every known shard, newest first
    pub fn find(&self, filter: Value) -> FanOutQuery {
        let shards = self.inner.registry.snapshot_descending();
        debug!(journal = %self.name(), shards = shards.len(), "Building fan-out query");

        let queries = shards
            .into_iter()
            .map(|shard| {
                ShardQuery::new(self.inner.store.clone(), shard, FindQuery::new(filter.clone()))
            })
            .collect();
        FanOutQuery::new(self.inner.config.name.clone(), queries)
    }

    /// Update the first match in every known shard
    ///
    /// Succeeds when at least one shard succeeded (or no shard exists);
    /// otherwise returns the last shard error, in newest-first order.
    pub async fn update(&self, selector: &Value, update: &Value) -> Result<()> {
        let shards = self.inner.registry.snapshot_descending();
        let results = join_all(
            shards
                .iter()
                .map(|shard| self.inner.store.update(shard, selector, update)),
        )
        .await;
        settle_broadcast(self.name(), "update", &shards, results)?;
        Ok(())
    }

    /// Update every match in every known shard
    ///
    /// Same success policy as [`JournalCollection::update`]. Returns the
    /// total number of matched documents over the shards that succeeded.
    pub async fn update_all(&self, selector: &Value, update: &Value) -> Result<u64> {
        let shards = self.inner.registry.snapshot_descending();
        let results = join_all(
            shards
                .iter()
                .map(|shard| self.inner.store.update_all(shard, selector, update)),
        )
        .await;
        let matched = settle_broadcast(self.name(), "update_all", &shards, results)?;
        Ok(matched.into_iter().sum())
    }

    /// Update the document with this id in its shard
    pub async fn update_by_id(&self, id: DocumentId, update: &Value) -> Result<()> {
        let shard = self.shard_name(id);
        self.inner.store.update_by_id(&shard, id, update).await?;
        Ok(())
    }

    /// Update or insert the document with this id in its shard
    ///
    /// An upsert may create the first document of a shard, so it queues the
    /// same shard list update as an insert.
    pub async fn upsert_by_id(&self, id: DocumentId, update: &Value) -> Result<()> {
        let shard = self.shard_name(id);
        self.inner.store.upsert_by_id(&shard, id, update).await?;
        self.enqueue_reconcile(id);
        Ok(())
    }

    /// Register the shard holding `id` now, bypassing the worker
    ///
    /// Returns true when the shard was new.
    pub async fn reconcile(&self, id: DocumentId) -> Result<bool> {
        self.inner.reconcile(id).await
    }

    /// Re-read the persisted shard list now
    ///
    /// Returns how many shards were new to this instance.
    pub async fn refresh(&self) -> Result<usize> {
        self.inner.refresh().await
    }

    /// Wait until every shard list update queued so far has been applied
    pub async fn flush_reconciliation(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.reconcile_tx
            .send(ReconcileTask::Flush(done_tx))
            .map_err(|_| JournalError::Closed(self.name().to_string()))?;
        done_rx
            .await
            .map_err(|_| JournalError::Closed(self.name().to_string()))
    }

    /// Drain queued work and stop the background tasks
    pub async fn shutdown(self) {
        if let Err(err) = self.flush_reconciliation().await {
            warn!(journal = %self.name(), error = %err, "Reconcile queue not drained");
        }

        let Self {
            inner,
            reconcile_tx,
            refresh_shutdown,
            tasks,
        } = self;
        drop(reconcile_tx);
        drop(refresh_shutdown);
        for task in tasks {
            let _ = task.await;
        }
        info!(journal = %inner.config.name, "Journal shut down");
    }

    fn enqueue_reconcile(&self, id: DocumentId) {
        if self.reconcile_tx.send(ReconcileTask::Observe(id)).is_err() {
            warn!(journal = %self.name(), id, "Reconcile worker is gone, shard list not updated");
        }
    }

    /// Best effort: failures are logged, never surfaced to the insert
    async fn ensure_indexes(&self, shard: &str) {
        if self.inner.config.indexes.is_empty() || self.inner.indexed.read(|s| s.contains(shard)) {
            return;
        }

        let mut all_ok = true;
        for index in &self.inner.config.indexes {
            let mut index = index.clone();
            index.background = true;
            if let Err(err) = self.inner.store.ensure_index(shard, &index).await {
                all_ok = false;
                warn!(
                    shard = %shard,
                    index = %index.resolved_name(),
                    error = %err,
                    "Failed to ensure index"
                );
            }
        }

        if all_ok {
            self.inner.indexed.update(|s| s.insert(shard.to_string()));
        }
    }
}

impl std::fmt::Debug for JournalCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalCollection")
            .field("name", &self.inner.config.name)
            .field("interval", &self.inner.config.interval)
            .field("read_only", &self.inner.config.read_only)
            .field("shards", &self.inner.registry.known_count())
            .finish()
    }
}

/// Apply the broadcast success policy to per-shard results
fn settle_broadcast<T>(
    journal: &str,
    op: &'static str,
    shards: &[ShardName],
    results: Vec<StoreResult<T>>,
) -> std::result::Result<Vec<T>, StoreError> {
    let mut successes = Vec::with_capacity(results.len());
    let mut last_error = None;

    for (shard, result) in shards.iter().zip(results) {
        match result {
            Ok(value) => successes.push(value),
            Err(err) => {
                debug!(journal = %journal, shard = %shard, op, error = %err, "Broadcast write failed on shard");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) if successes.is_empty() => Err(err),
        _ => Ok(successes),
    }
}
