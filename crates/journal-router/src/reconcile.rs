//! Shard list maintenance
//!
//! Two paths keep the registry current:
//!
//! - **Reconciliation** (writers): every successful insert enqueues a
//!   [`ReconcileTask::Observe`] on an unbounded channel. A single worker task
//!   drains it and registers the shard implied by each id once that id
//!   crosses past the newest known shard. Insert never waits for this; a
//!   freshly crossed shard boundary stays invisible to `find` until the
//!   worker has processed it.
//! - **Refresh** (read-only replicas): a timer task re-reads the persisted
//!   record once per period and merges it into the registry.
//!
//! Both paths run under the journal's maintenance gate, so a
//! check-append-persist sequence is never interleaved with another one or
//! with a refresh. The registry mutex itself is only held for in-memory work.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::collection::JournalInner;
use crate::error::Result;
use crate::namer::{parse_shard_number, shard_name_for_number, shard_number};
use crate::types::{DocumentId, ShardNumber};

/// Work item for the reconcile worker
#[derive(Debug)]
pub(crate) enum ReconcileTask {
    /// A document with this id was written
    Observe(DocumentId),
    /// Signal once every task queued before this one is done
    Flush(oneshot::Sender<()>),
}

impl JournalInner {
    /// Register the shard holding `id` if it lies past the known shards
    ///
    /// The shard list is ordered oldest to newest, so a shard is only
    /// appended when its number exceeds both the known shard count and the
    /// number of the newest known shard. Ids landing in an older, unlisted
    /// shard stay reachable through `find_by_id` but not through `find`.
    ///
    /// Returns true when a shard was added. Safe to call concurrently and
    /// repeatedly; a known shard is never added twice.
    pub(crate) async fn reconcile(&self, id: DocumentId) -> Result<bool> {
        let number = shard_number(id, self.config.interval);
        if number <= self.registry.known_count() as u64 && !self.persist_pending.load(Ordering::Acquire) {
            return Ok(false);
        }

        let _gate = self.gate.lock().await;
        let shard = shard_name_for_number(&self.config.name, number);
        let added = self.is_past_newest(number) && self.registry.register(shard.clone()).is_some();
        if !added && !self.persist_pending.load(Ordering::Acquire) {
            if !self.registry.contains(&shard) {
                debug!(
                    journal = %self.config.name,
                    shard = %shard,
                    id,
                    "Shard precedes the newest known shard, not registered"
                );
            }
            return Ok(false);
        }
        if added {
            info!(
                journal = %self.config.name,
                instance = %self.config.instance_id,
                shard = %shard,
                shards = self.registry.known_count(),
                "New shard registered"
            );
        }

        let record = self.registry.snapshot();
        match self.metadata.persist(&record).await {
            Ok(()) => {
                self.persist_pending.store(false, Ordering::Release);
                Ok(added)
            }
            Err(err) => {
                // Kept in memory; the next reconcile retries the upsert
                self.persist_pending.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Whether shard `number` would become the newest shard
    fn is_past_newest(&self, number: ShardNumber) -> bool {
        if number <= self.registry.known_count() as u64 {
            return false;
        }
        // Names without a number of this journal fall back to the count check
        self.registry
            .newest()
            .and_then(|newest| parse_shard_number(&self.config.name, &newest))
            .map_or(true, |newest| number > newest)
    }

    /// Merge the persisted record into the registry
    ///
    /// Returns the number of shards that were new to this instance.
    pub(crate) async fn refresh(&self) -> Result<usize> {
        let _gate = self.gate.lock().await;
        let Some(loaded) = self.metadata.load().await? else {
            trace!(journal = %self.config.name, "No shard metadata persisted yet");
            return Ok(0);
        };

        let added = self.registry.absorb(loaded);
        if added > 0 {
            info!(
                journal = %self.config.name,
                instance = %self.config.instance_id,
                added,
                shards = self.registry.known_count(),
                "Shard list refreshed"
            );
        }
        Ok(added)
    }
}

/// Start the reconcile worker; it stops once every sender is dropped
pub(crate) fn spawn_reconciler(
    inner: Arc<JournalInner>,
    mut tasks: mpsc::UnboundedReceiver<ReconcileTask>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = tasks.recv().await {
            match task {
                ReconcileTask::Observe(id) => {
                    if let Err(err) = inner.reconcile(id).await {
                        warn!(
                            journal = %inner.config.name,
                            id,
                            error = %err,
                            "Shard reconciliation failed"
                        );
                    }
                }
                ReconcileTask::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!(journal = %inner.config.name, "Reconcile worker stopped");
    })
}

/// Start the periodic refresh used by read-only instances
///
/// The first refresh happens one full period after start. The loop stops
/// when the shutdown sender is dropped or signalled.
pub(crate) fn spawn_refresher(
    inner: Arc<JournalInner>,
    period: Duration,
    mut shutdown: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(journal = %inner.config.name, "Shard list refresh shutting down");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(err) = inner.refresh().await {
                        warn!(
                            journal = %inner.config.name,
                            error = %err,
                            "Shard list refresh failed"
                        );
                    }
                }
            }
        }
    })
}
