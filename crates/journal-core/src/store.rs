//! Backing store contract
//!
//! The journal never talks to a database directly. Every physical collection
//! (a shard, or the `-settings` metadata collection) is addressed by name
//! through [`BackingStore`], which executes plain logical operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A stored document (always a JSON object)
pub type Document = Value;

/// Numeric document identifier, stored in the `_id` field
pub type DocumentId = u64;

/// Name of the primary key field
pub const ID_FIELD: &str = "_id";

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a backing store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A single-document lookup matched nothing
    #[error("not found")]
    NotFound,

    /// Unique index violation
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The request was malformed (bad filter, bad update, non-object document)
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Network, server or any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Secondary index specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Indexed fields, `-field` for descending
    pub key: Vec<String>,

    /// Reject documents that repeat an indexed value
    pub unique: bool,

    /// Build without blocking the collection
    pub background: bool,

    /// Optional explicit index name
    pub name: Option<String>,
}

impl IndexSpec {
    /// Create a non-unique index over the given fields
    pub fn new<I, S>(key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into_iter().map(Into::into).collect(),
            unique: false,
            background: false,
            name: None,
        }
    }

    /// Mark the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Give the index an explicit name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Index name as the store would derive it (`field_1_other_-1`)
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.key
            .iter()
            .map(|field| match field.strip_prefix('-') {
                Some(field) => format!("{}_-1", field),
                None => format!("{}_1", field),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Description of a find operation against one physical collection
///
/// `limit == 0` means unbounded. Sort fields use a leading `-` for
/// descending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindQuery {
    pub filter: Value,
    pub skip: usize,
    pub limit: usize,
    pub sort: Vec<String>,
    pub projection: Option<Value>,
}

impl FindQuery {
    /// Query matching `filter` with no paging, sort or projection
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            skip: 0,
            limit: 0,
            sort: Vec::new(),
            projection: None,
        }
    }

    /// Query matching a single `_id`
    pub fn by_id(id: DocumentId) -> Self {
        Self::new(serde_json::json!({ ID_FIELD: id }))
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Parse an mgo-style sort string (`"-time,name"` or `"-time name"`)
    pub fn with_sort(mut self, sort: &str) -> Self {
        self.sort = sort
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn with_projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Logical operations the journal requires from its document store
///
/// Implementations must be safe for concurrent use; the journal issues calls
/// from many tasks at once and never serializes them.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Create the index if it is missing
    async fn ensure_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;

    async fn insert(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// All matching documents after sort, skip and limit
    async fn find(&self, collection: &str, query: &FindQuery) -> StoreResult<Vec<Document>>;

    /// First matching document, or [`StoreError::NotFound`]
    async fn find_one(&self, collection: &str, query: &FindQuery) -> StoreResult<Document>;

    /// Number of documents matching the filter (skip and limit applied)
    async fn count(&self, collection: &str, query: &FindQuery) -> StoreResult<usize>;

    /// Distinct values of `key` among matching documents
    async fn distinct(&self, collection: &str, query: &FindQuery, key: &str)
        -> StoreResult<Vec<Value>>;

    /// Update the document with this `_id`, [`StoreError::NotFound`] if absent
    async fn update_by_id(&self, collection: &str, id: DocumentId, update: &Value)
        -> StoreResult<()>;

    /// Update the first matching document, [`StoreError::NotFound`] if none
    async fn update(&self, collection: &str, selector: &Value, update: &Value) -> StoreResult<()>;

    /// Update every matching document, returning how many matched
    async fn update_all(&self, collection: &str, selector: &Value, update: &Value)
        -> StoreResult<u64>;

    /// Update the document with this `_id`, inserting it when absent
    async fn upsert_by_id(&self, collection: &str, id: DocumentId, update: &Value)
        -> StoreResult<()>;
}
