//! In-process backing store
//!
//! Keeps every collection as a vector of JSON documents in insertion order.
//! Supports the subset of query and update operators the journal and its
//! callers rely on, plus fault injection and an operation log for tests.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::trace;

use crate::store::{
    BackingStore, Document, DocumentId, FindQuery, IndexSpec, StoreError, StoreResult, ID_FIELD,
};

/// Kind of store operation, as recorded in the operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    EnsureIndex,
    Insert,
    Find,
    FindOne,
    Count,
    Distinct,
    UpdateById,
    Update,
    UpdateAll,
    UpsertById,
}

/// One logged store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub collection: String,
    pub kind: OperationKind,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// Backing store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    failing: RwLock<HashSet<String>>,
    operations: Mutex<Vec<Operation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail with a backend error
    pub fn fail_collection(&self, collection: &str) {
        self.failing.write().insert(collection.to_string());
    }

    /// Undo [`MemoryStore::fail_collection`]
    pub fn heal_collection(&self, collection: &str) {
        self.failing.write().remove(collection);
    }

    /// Every store call made so far, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.lock().clone()
    }

    /// Whether any operation has addressed `collection`
    pub fn touched(&self, collection: &str) -> bool {
        self.operations.lock().iter().any(|op| op.collection == collection)
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Snapshot of a collection's documents in natural order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Names of all collections that exist, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Indexes created on a collection
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    fn begin(&self, collection: &str, kind: OperationKind) -> StoreResult<()> {
        trace!(collection = %collection, ?kind, "memory store operation");
        self.operations.lock().push(Operation {
            collection: collection.to_string(),
            kind,
        });
        if self.failing.read().contains(collection) {
            return Err(StoreError::Backend(format!("collection {} unavailable", collection)));
        }
        Ok(())
    }

    fn update_matching(
        &self,
        collection: &str,
        selector: &Value,
        update: &Value,
        multi: bool,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        match collections.get_mut(collection) {
            Some(coll) => coll.update_matching(selector, update, multi),
            None => Ok(0),
        }
    }

    fn matching(&self, collection: &str, filter: &Value) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(vec![]);
        };
        let mut out = Vec::new();
        for doc in &coll.documents {
            if matches_filter(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn ensure_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        self.begin(collection, OperationKind::EnsureIndex)?;
        if index.key.is_empty() {
            return Err(StoreError::Invalid("index key must not be empty".to_string()));
        }
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let name = index.resolved_name();
        if !coll.indexes.iter().any(|i| i.resolved_name() == name) {
            coll.indexes.push(index.clone());
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.begin(collection, OperationKind::Insert)?;
        if !document.is_object() {
            return Err(StoreError::Invalid("document must be an object".to_string()));
        }
        let mut collections = self.collections.write();
        collections.entry(collection.to_string()).or_default().push(document)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> StoreResult<Vec<Document>> {
        self.begin(collection, OperationKind::Find)?;
        let mut docs = self.matching(collection, &query.filter)?;
        sort_documents(&mut docs, &query.sort);

        let docs = docs.into_iter().skip(query.skip);
        let docs: Vec<_> = if query.limit > 0 {
            docs.take(query.limit).collect()
        } else {
            docs.collect()
        };

        match &query.projection {
            Some(projection) => docs.iter().map(|d| project(d, projection)).collect(),
            None => Ok(docs),
        }
    }

    async fn find_one(&self, collection: &str, query: &FindQuery) -> StoreResult<Document> {
        self.begin(collection, OperationKind::FindOne)?;
        let mut docs = self.matching(collection, &query.filter)?;
        sort_documents(&mut docs, &query.sort);
        let doc = docs
            .into_iter()
            .nth(query.skip)
            .ok_or(StoreError::NotFound)?;
        match &query.projection {
            Some(projection) => project(&doc, projection),
            None => Ok(doc),
        }
    }

    async fn count(&self, collection: &str, query: &FindQuery) -> StoreResult<usize> {
        self.begin(collection, OperationKind::Count)?;
        let n = self.matching(collection, &query.filter)?.len();
        let n = n.saturating_sub(query.skip);
        Ok(if query.limit > 0 { n.min(query.limit) } else { n })
    }

    async fn distinct(
        &self,
        collection: &str,
        query: &FindQuery,
        key: &str,
    ) -> StoreResult<Vec<Value>> {
        self.begin(collection, OperationKind::Distinct)?;
        let mut values: Vec<Value> = Vec::new();
        for doc in self.matching(collection, &query.filter)? {
            let found = match lookup(&doc, key) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.iter().any(|v| values_equal(v, &value)) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        update: &Value,
    ) -> StoreResult<()> {
        self.begin(collection, OperationKind::UpdateById)?;
        let selector = FindQuery::by_id(id).filter;
        match self.update_matching(collection, &selector, update, false)? {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn update(&self, collection: &str, selector: &Value, update: &Value) -> StoreResult<()> {
        self.begin(collection, OperationKind::Update)?;
        match self.update_matching(collection, selector, update, false)? {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn update_all(
        &self,
        collection: &str,
        selector: &Value,
        update: &Value,
    ) -> StoreResult<u64> {
        self.begin(collection, OperationKind::UpdateAll)?;
        self.update_matching(collection, selector, update, true)
    }

    async fn upsert_by_id(
        &self,
        collection: &str,
        id: DocumentId,
        update: &Value,
    ) -> StoreResult<()> {
        self.begin(collection, OperationKind::UpsertById)?;
        let selector = FindQuery::by_id(id).filter;

        // Match, update and insert under one guard so concurrent upserts of
        // the same id cannot both insert
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.update_matching(&selector, update, false)? > 0 {
            return Ok(());
        }

        let mut doc = Value::Object(Map::new());
        doc[ID_FIELD] = Value::from(id);
        apply_update(&mut doc, update)?;
        coll.push(doc)
    }
}

impl MemoryCollection {
    /// Reject a document that collides on `_id` or on a unique index
    fn check_insertable(&self, document: &Document) -> StoreResult<()> {
        if let Some(id) = document.get(ID_FIELD) {
            if self.documents.iter().any(|d| d.get(ID_FIELD) == Some(id)) {
                return Err(StoreError::DuplicateKey(format!("{}: {}", ID_FIELD, id)));
            }
        }
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index_key(document, index);
            if self.documents.iter().any(|d| index_key(d, index) == key) {
                return Err(StoreError::DuplicateKey(index.resolved_name()));
            }
        }
        Ok(())
    }

    fn push(&mut self, document: Document) -> StoreResult<()> {
        self.check_insertable(&document)?;
        self.documents.push(document);
        Ok(())
    }

    /// Apply `update` to the first (or every) match
    ///
    /// Updates are computed on copies and written back only once every
    /// matching document accepted them, so a failing update changes nothing.
    fn update_matching(&mut self, selector: &Value, update: &Value, multi: bool) -> StoreResult<u64> {
        let mut staged = Vec::new();
        for (pos, doc) in self.documents.iter().enumerate() {
            if !matches_filter(doc, selector)? {
                continue;
            }
            let mut next = doc.clone();
            apply_update(&mut next, update)?;
            staged.push((pos, next));
            if !multi {
                break;
            }
        }

        let matched = staged.len() as u64;
        for (pos, next) in staged {
            self.documents[pos] = next;
        }
        Ok(matched)
    }
}

/// Resolve a possibly dotted field path
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, part| value.get(part))
}

fn index_key(doc: &Value, index: &IndexSpec) -> Vec<Option<Value>> {
    index
        .key
        .iter()
        .map(|field| lookup(doc, field.trim_start_matches('-')).cloned())
        .collect()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Type rank used to order values of different kinds
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Compare two values of the same kind, `None` when they are not comparable
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn sort_documents(docs: &mut [Document], sort: &[String]) {
    if sort.is_empty() {
        return;
    }
    // Stable, so ties keep natural order
    docs.sort_by(|a, b| {
        for field in sort {
            let (path, descending) = match field.strip_prefix('-') {
                Some(path) => (path, true),
                None => (field.trim_start_matches('+'), false),
            };
            let order = sort_order(lookup(a, path), lookup(b, path));
            let order = if descending { order.reverse() } else { order };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    });
}

fn matches_filter(doc: &Value, filter: &Value) -> StoreResult<bool> {
    let conditions = match filter {
        Value::Null => return Ok(true),
        Value::Object(conditions) => conditions,
        other => return Err(StoreError::Invalid(format!("filter must be an object, got {}", other))),
    };
    for (field, condition) in conditions {
        if !matches_condition(lookup(doc, field), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    let operators = match condition {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
        _ => return Ok(value.map_or(condition.is_null(), |v| values_equal(v, condition))),
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => value.map_or(operand.is_null(), |v| values_equal(v, operand)),
            "$ne" => !value.map_or(operand.is_null(), |v| values_equal(v, operand)),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let Some(order) = value.and_then(|v| compare_values(v, operand)) else {
                    return Ok(false);
                };
                match op.as_str() {
                    "$gt" => order == Ordering::Greater,
                    "$gte" => order != Ordering::Less,
                    "$lt" => order == Ordering::Less,
                    _ => order != Ordering::Greater,
                }
            }
            "$in" | "$nin" => {
                let Value::Array(candidates) = operand else {
                    return Err(StoreError::Invalid(format!("{} needs an array", op)));
                };
                let found = value.map_or(false, |v| candidates.iter().any(|c| values_equal(v, c)));
                if op == "$in" {
                    found
                } else {
                    !found
                }
            }
            other => return Err(StoreError::Invalid(format!("unknown operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_update(doc: &mut Document, update: &Value) -> StoreResult<()> {
    let Value::Object(ops) = update else {
        return Err(StoreError::Invalid("update must be an object".to_string()));
    };

    let operator_count = ops.keys().filter(|k| k.starts_with('$')).count();
    if operator_count == 0 {
        // Replacement keeps the original _id
        let id = doc.get(ID_FIELD).cloned();
        let mut replacement = update.clone();
        if let Some(id) = id {
            replacement[ID_FIELD] = id;
        }
        *doc = replacement;
        return Ok(());
    }
    if operator_count != ops.len() {
        return Err(StoreError::Invalid("cannot mix operators and fields in update".to_string()));
    }

    let Value::Object(fields) = doc else {
        return Err(StoreError::Invalid("document must be an object".to_string()));
    };
    for (op, operand) in ops {
        let Value::Object(operand) = operand else {
            return Err(StoreError::Invalid(format!("{} needs an object", op)));
        };
        match op.as_str() {
            "$set" => {
                for (field, value) in operand {
                    fields.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for field in operand.keys() {
                    fields.remove(field);
                }
            }
            "$inc" => {
                for (field, delta) in operand {
                    let current = fields.get(field).cloned().unwrap_or(Value::from(0));
                    let next = match (current.as_i64(), delta.as_i64()) {
                        (Some(a), Some(b)) => match a.checked_add(b) {
                            Some(sum) => Value::from(sum),
                            None => {
                                return Err(StoreError::Invalid(format!(
                                    "increment of {} overflows",
                                    field
                                )))
                            }
                        },
                        _ => match (current.as_f64(), delta.as_f64()) {
                            (Some(a), Some(b)) => Value::from(a + b),
                            _ => {
                                return Err(StoreError::Invalid(format!(
                                    "cannot increment non-numeric field {}",
                                    field
                                )))
                            }
                        },
                    };
                    fields.insert(field.clone(), next);
                }
            }
            other => return Err(StoreError::Invalid(format!("unknown update operator {}", other))),
        }
    }
    Ok(())
}

fn project(doc: &Document, projection: &Value) -> StoreResult<Document> {
    let Value::Object(spec) = projection else {
        return Err(StoreError::Invalid("projection must be an object".to_string()));
    };
    let Value::Object(fields) = doc else {
        return Ok(doc.clone());
    };
    let truthy = |v: &Value| v.as_bool().unwrap_or_else(|| v.as_f64().map_or(false, |n| n != 0.0));

    let inclusive = spec.iter().any(|(field, v)| field != ID_FIELD && truthy(v));
    let keep_id = spec.get(ID_FIELD).map_or(true, truthy);

    let mut out = Map::new();
    for (field, value) in fields {
        let keep = if field == ID_FIELD {
            keep_id
        } else if inclusive {
            spec.get(field).map_or(false, truthy)
        } else {
            spec.get(field).map_or(true, |v| truthy(v))
        };
        if keep {
            out.insert(field.clone(), value.clone());
        }
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::block_on;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..5u64 {
            block_on(store.insert("players", json!({ "_id": i, "login": format!("p{}", i), "score": i * 10 })))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_find_natural_order_and_paging() {
        let store = seeded();
        let query = FindQuery::new(json!({})).with_skip(1).with_limit(2);
        let docs = block_on(store.find("players", &query)).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_find_sort_descending() {
        let store = seeded();
        let query = FindQuery::new(json!({ "score": { "$gte": 20 } })).with_sort("-_id");
        let docs = block_on(store.find("players", &query)).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[test]
    fn test_filter_in_and_ne() {
        let store = seeded();
        let query = FindQuery::new(json!({ "_id": { "$in": [1, 3, 9] }, "login": { "$ne": "p3" } }));
        let docs = block_on(store.find("players", &query)).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["login"], "p1");
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let store = seeded();
        let query = FindQuery::new(json!({ "_id": { "$regex": "x" } }));
        assert!(matches!(block_on(store.find("players", &query)), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_projection_inclusive() {
        let store = seeded();
        let query = FindQuery::by_id(2).with_projection(json!({ "login": 1 }));
        let doc = block_on(store.find_one("players", &query)).unwrap();
        assert_eq!(doc, json!({ "_id": 2, "login": "p2" }));

        let query = FindQuery::by_id(2).with_projection(json!({ "score": 0, "_id": 0 }));
        let doc = block_on(store.find_one("players", &query)).unwrap();
        assert_eq!(doc, json!({ "login": "p2" }));
    }

    #[test]
    fn test_count_and_find_one_missing() {
        let store = seeded();
        assert_eq!(block_on(store.count("players", &FindQuery::new(json!({})))).unwrap(), 5);
        assert_eq!(block_on(store.count("nothing", &FindQuery::new(json!({})))).unwrap(), 0);
        let missing = block_on(store.find_one("players", &FindQuery::by_id(99)));
        assert_eq!(missing, Err(StoreError::NotFound));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = seeded();
        let result = block_on(store.insert("players", json!({ "_id": 1 })));
        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    }

    #[test]
    fn test_unique_index_enforced() {
        let store = MemoryStore::new();
        let index = IndexSpec::new(["login"]).unique();
        block_on(store.ensure_index("players", &index)).unwrap();
        block_on(store.ensure_index("players", &index)).unwrap();
        assert_eq!(store.indexes("players").len(), 1);

        block_on(store.insert("players", json!({ "_id": 1, "login": "alice" }))).unwrap();
        let result = block_on(store.insert("players", json!({ "_id": 2, "login": "alice" })));
        assert_eq!(result, Err(StoreError::DuplicateKey("login_1".to_string())));
    }

    #[test]
    fn test_update_operators() {
        let store = seeded();
        block_on(store.update_by_id("players", 1, &json!({ "$set": { "login": "x" }, "$inc": { "score": 5 } })))
            .unwrap();
        let doc = block_on(store.find_one("players", &FindQuery::by_id(1))).unwrap();
        assert_eq!(doc["login"], "x");
        assert_eq!(doc["score"], 15);

        let missing = block_on(store.update_by_id("players", 42, &json!({ "$set": { "a": 1 } })));
        assert_eq!(missing, Err(StoreError::NotFound));
    }

    #[test]
    fn test_update_all_counts_matches() {
        let store = seeded();
        let matched = block_on(store.update_all(
            "players",
            &json!({ "score": { "$lt": 30 } }),
            &json!({ "$set": { "rookie": true } }),
        ))
        .unwrap();
        assert_eq!(matched, 3);

        let none = block_on(store.update_all("players", &json!({ "score": 1000 }), &json!({ "$set": { "a": 1 } })))
            .unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new();
        block_on(store.upsert_by_id("meta", 1, &json!({ "list": ["a"] }))).unwrap();
        block_on(store.upsert_by_id("meta", 1, &json!({ "list": ["a", "b"] }))).unwrap();

        let docs = store.documents("meta");
        assert_eq!(docs, vec![json!({ "_id": 1, "list": ["a", "b"] })]);
    }

    #[test]
    fn test_concurrent_upserts_keep_id_unique() {
        let store = MemoryStore::new();
        let workers = 8;

        for id in 0..50u64 {
            let barrier = std::sync::Barrier::new(workers);
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| {
                        barrier.wait();
                        block_on(store.upsert_by_id("counters", id, &json!({ "$inc": { "v": 1 } }))).unwrap();
                    });
                }
            });
        }

        let docs = store.documents("counters");
        assert_eq!(docs.len(), 50);
        for (id, doc) in docs.iter().enumerate() {
            assert_eq!(doc["_id"], json!(id));
            assert_eq!(doc["v"], json!(workers));
        }
    }

    #[test]
    fn test_upsert_respects_unique_index() {
        let store = MemoryStore::new();
        block_on(store.ensure_index("players", &IndexSpec::new(["login"]).unique())).unwrap();
        block_on(store.insert("players", json!({ "_id": 1, "login": "alice" }))).unwrap();

        let result = block_on(store.upsert_by_id("players", 2, &json!({ "$set": { "login": "alice" } })));
        assert_eq!(result, Err(StoreError::DuplicateKey("login_1".to_string())));
        assert_eq!(store.documents("players").len(), 1);
    }

    #[test]
    fn test_inc_overflow_is_rejected() {
        let store = MemoryStore::new();
        block_on(store.insert("c", json!({ "_id": 1, "v": i64::MAX }))).unwrap();

        let result = block_on(store.update_by_id("c", 1, &json!({ "$inc": { "v": 1 } })));
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert_eq!(store.documents("c"), vec![json!({ "_id": 1, "v": i64::MAX })]);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let store = seeded();
        block_on(store.update_by_id("players", 4, &json!({ "$set": { "score": "high" } }))).unwrap();
        let before = store.documents("players");

        // $inc on a string fails, so $set on the same document must not land
        let result = block_on(store.update_by_id(
            "players",
            1,
            &json!({ "$set": { "login": "changed" }, "$inc": { "login": 1 } }),
        ));
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert_eq!(store.documents("players"), before);

        // Documents 0..3 accept the increment, document 4 does not
        let result = block_on(store.update_all("players", &json!({}), &json!({ "$inc": { "score": 1 } })));
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert_eq!(store.documents("players"), before);
    }

    #[test]
    fn test_distinct_flattens_and_dedups() {
        let store = MemoryStore::new();
        block_on(store.insert("tags", json!({ "_id": 1, "tag": ["a", "b"] }))).unwrap();
        block_on(store.insert("tags", json!({ "_id": 2, "tag": "a" }))).unwrap();
        block_on(store.insert("tags", json!({ "_id": 3 }))).unwrap();

        let values = block_on(store.distinct("tags", &FindQuery::new(json!({})), "tag")).unwrap();
        assert_eq!(values, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_fault_injection_and_log() {
        let store = seeded();
        store.clear_operations();
        store.fail_collection("players");

        let result = block_on(store.count("players", &FindQuery::new(json!({}))));
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert!(store.touched("players"));
        assert!(!store.touched("other"));

        store.heal_collection("players");
        assert!(block_on(store.count("players", &FindQuery::new(json!({})))).is_ok());
        assert_eq!(store.operations().len(), 2);
    }
}
