//! Query handles
//!
//! [`ShardQuery`] addresses exactly one shard. [`FanOutQuery`] holds one
//! `ShardQuery` per known shard, newest shard first, plus the global paging
//! state, and materializes results across shard boundaries.
//!
//! # Paging across shards
//!
//! ```text
//! skip = 5, limit = 8, shards newest-first with 10 docs each
//!
//!   players-3  [ s s s s s | r r r r r ]   skip 5 inside shard, take 5
//!   players-2  [ r r r | . . . . . . . ]   take the remaining 3, stop
//!   players-1  never queried
//! ```
//!
//! When a skip is pending, a shard's matching count is fetched first so a
//! shard entirely covered by the skip is passed over without reading any
//! documents.

use std::sync::Arc;

use journal_core::{BackingStore, Document, FindQuery};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{JournalError, Result};
use crate::types::ShardName;

/// Query against a single shard
#[derive(Clone)]
pub struct ShardQuery {
    store: Arc<dyn BackingStore>,
    shard: ShardName,
    query: FindQuery,
}

impl ShardQuery {
    pub(crate) fn new(store: Arc<dyn BackingStore>, shard: ShardName, query: FindQuery) -> Self {
        Self { store, shard, query }
    }

    /// Shard this query runs against
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Current query description
    pub fn spec(&self) -> &FindQuery {
        &self.query
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.query.skip = n;
        self
    }

    /// Limit the number of documents; 0 means unbounded
    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = n;
        self
    }

    /// Sort by fields, `-field` for descending (`"-time,login"`)
    pub fn sort(mut self, sort: &str) -> Self {
        self.query = self.query.with_sort(sort);
        self
    }

    /// Apply a projection
    pub fn select(mut self, projection: Value) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Raw matching documents
    pub async fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.store.find(&self.shard, &self.query).await?)
    }

    /// All matching documents decoded as `T`
    pub async fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let docs = self.documents().await?;
        decode_all(&self.shard, docs)
    }

    /// First matching document, or the store's not-found error
    pub async fn one<T: DeserializeOwned>(&self) -> Result<T> {
        let doc = self.store.find_one(&self.shard, &self.query).await?;
        decode(&self.shard, doc)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.count(&self.shard, &self.query).await?)
    }

    /// Distinct values of `key` within this shard
    pub async fn distinct<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let values = self.store.distinct(&self.shard, &self.query, key).await?;
        decode_all(&self.shard, values)
    }
}

impl std::fmt::Debug for ShardQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardQuery")
            .field("shard", &self.shard)
            .field("query", &self.query)
            .finish()
    }
}

/// Query spanning every known shard of a journal
///
/// Built from one registry snapshot; shards registered afterwards are not
/// visible to it.
#[derive(Debug, Clone)]
pub struct FanOutQuery {
    journal: String,
    queries: Vec<ShardQuery>,
    skip: usize,
    limit: usize,
}

impl FanOutQuery {
    pub(crate) fn new(journal: String, queries: Vec<ShardQuery>) -> Self {
        Self {
            journal,
            queries,
            skip: 0,
            limit: 0,
        }
    }

    /// Shards in traversal order
    pub fn shard_names(&self) -> Vec<&str> {
        self.queries.iter().map(ShardQuery::shard).collect()
    }

    /// Number of shards covered
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Apply a projection to every shard
    pub fn select(mut self, projection: Value) -> Self {
        self.queries = self
            .queries
            .into_iter()
            .map(|q| q.select(projection.clone()))
            .collect();
        self
    }

    /// Sort within every shard; shards are still visited newest-first
    pub fn sort(mut self, sort: &str) -> Self {
        self.queries = self.queries.into_iter().map(|q| q.sort(sort)).collect();
        self
    }

    /// Skip `n` documents across the whole journal
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Return at most `n` documents across the whole journal; 0 means unbounded
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Materialize the query into `dest`
    ///
    /// Replaces the contents of `dest` with the matching documents in
    /// traversal order. A shard that fails to answer is logged and skipped;
    /// a document that does not decode as `T` fails the whole call and leaves
    /// `dest` untouched.
    pub async fn all<T: DeserializeOwned>(&self, dest: &mut Vec<T>) -> Result<()> {
        let mut skip = self.skip;
        let mut remaining = (self.limit > 0).then_some(self.limit);
        let mut out = Vec::new();

        debug!(
            journal = %self.journal,
            shards = self.queries.len(),
            skip = self.skip,
            limit = self.limit,
            "Fan-out query"
        );

        for query in &self.queries {
            let page = if skip > 0 {
                let count = match query.count().await {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(shard = %query.shard(), error = %err, "Shard count failed, skipping shard");
                        continue;
                    }
                };
                if count <= skip {
                    trace!(shard = %query.shard(), count, skip, "Shard consumed by skip");
                    skip -= count;
                    continue;
                }
                let page = query.clone().skip(skip).limit(remaining.unwrap_or(0));
                skip = 0;
                page
            } else {
                query.clone().limit(remaining.unwrap_or(0))
            };

            match page.documents().await {
                Ok(docs) => {
                    trace!(shard = %page.shard(), fetched = docs.len(), "Shard page fetched");
                    if let Some(left) = remaining.as_mut() {
                        *left = left.saturating_sub(docs.len());
                    }
                    out.extend(decode_all::<T>(page.shard(), docs)?);
                }
                Err(err) => {
                    warn!(shard = %page.shard(), error = %err, "Shard fetch failed, continuing fan-out");
                }
            }

            if remaining == Some(0) {
                break;
            }
        }

        *dest = out;
        Ok(())
    }

    /// Materialize the query into a new vector
    pub async fn fetch_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.all(&mut out).await?;
        Ok(out)
    }

    /// First document of the newest shard that has a match
    ///
    /// Global skip and limit do not apply. Shards that fail to count are
    /// passed over.
    pub async fn one<T: DeserializeOwned>(&self) -> Result<T> {
        for query in &self.queries {
            match query.count().await {
                Ok(n) if n > 0 => return query.one().await,
                Ok(_) => {}
                Err(err) => {
                    warn!(shard = %query.shard(), error = %err, "Shard count failed, probing next shard");
                }
            }
        }
        Err(JournalError::NotFound)
    }

    /// Total matches across shards; the first shard error aborts the sum
    pub async fn count(&self) -> Result<usize> {
        let mut total = 0;
        for query in &self.queries {
            total += query.count().await?;
        }
        Ok(total)
    }

    /// Distinct values of `key`, per shard, concatenated newest-first
    ///
    /// Values are distinct within a shard only; the same value found in two
    /// shards appears twice. Replaces the contents of `dest`.
    pub async fn distinct<T: DeserializeOwned>(&self, key: &str, dest: &mut Vec<T>) -> Result<()> {
        let mut out = Vec::new();
        for query in &self.queries {
            match query.distinct::<T>(key).await {
                Ok(values) => out.extend(values),
                Err(err @ JournalError::Decode { .. }) => return Err(err),
                Err(err) => {
                    warn!(shard = %query.shard(), error = %err, "Shard distinct failed, continuing fan-out");
                }
            }
        }
        *dest = out;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(shard: &str, doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|source| JournalError::Decode {
        shard: shard.to_string(),
        source,
    })
}

fn decode_all<T: DeserializeOwned>(shard: &str, docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter().map(|doc| decode(shard, doc)).collect()
}
