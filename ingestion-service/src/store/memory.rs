use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::{btree_map::Entry, BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

use super::{CollectionPath, DocumentStore, QuerySpec, SortOrder, StoreError, WriteBatch, WriteOp};

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// In-process store for tests and local runs. Batches are applied to a copy
/// and swapped in only when every op succeeds.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    available: AtomicBool,
    commits_fail: AtomicBool,
    stale_reads: AtomicUsize,
    armed_update_failures: AtomicUsize,
    update_failures: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            commits_fail: AtomicBool::new(false),
            stale_reads: AtomicUsize::new(0),
            armed_update_failures: AtomicUsize::new(0),
            update_failures: AtomicUsize::new(0),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Reads keep working but every batch commit aborts.
    pub fn set_commits_fail(&self, fail: bool) {
        self.commits_fail.store(fail, AtomicOrdering::SeqCst);
    }

    /// The next `count` calls to `get` report a miss, as a reader racing a
    /// concurrent first write would see.
    pub fn miss_next_reads(&self, count: usize) {
        self.stale_reads.store(count, AtomicOrdering::SeqCst);
    }

    /// After the next successful batch commit, the following `count` guarded
    /// updates fail with `Unavailable`.
    pub fn fail_guarded_updates_after_commit(&self, count: usize) {
        self.armed_update_failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Number of documents stored under `path`.
    pub fn count(&self, path: &CollectionPath) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(&path.to_string()).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        if !self.available.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.collections
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Memory store mutex poisoned: {}", e)))
    }
}

/// Decrement `counter` if it is positive. Returns whether it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn apply(collections: &mut Collections, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Set { path, id, document } => {
            collections
                .entry(path.to_string())
                .or_default()
                .insert(id, document);
        }
        WriteOp::Update { path, id, fields } => {
            let existing = collections
                .get_mut(&path.to_string())
                .and_then(|c| c.get_mut(&id))
                .ok_or_else(|| StoreError::not_found(&path, &id))?;
            for (key, value) in fields {
                existing.insert(key, value);
            }
        }
        WriteOp::Delete { path, id } => {
            if let Some(collection) = collections.get_mut(&path.to_string()) {
                collection.remove(&id);
            }
        }
    }
    Ok(())
}

/// Ordering across the value types this service sorts on.
fn compare_bson(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(Bson::Int32(a)), Some(Bson::Int32(b))) => a.cmp(b),
        (Some(Bson::Int64(a)), Some(Bson::Int64(b))) => a.cmp(b),
        (Some(Bson::Double(a)), Some(Bson::Double(b))) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Some(Bson::Boolean(a)), Some(Bson::Boolean(b))) => a.cmp(b),
        (None | Some(Bson::Null), Some(_)) => Ordering::Less,
        (Some(_), None | Some(Bson::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.lock()?;
        if take_one(&self.stale_reads) {
            return Ok(None);
        }
        Ok(collections
            .get(&path.to_string())
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn insert(&self, path: &CollectionPath, id: &str, document: Document) -> Result<bool, StoreError> {
        let mut collections = self.lock()?;
        match collections.entry(path.to_string()).or_default().entry(id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(true)
            }
        }
    }

    async fn set(&self, path: &CollectionPath, id: &str, document: Document) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        apply(
            &mut collections,
            WriteOp::Set {
                path: path.clone(),
                id: id.to_string(),
                document,
            },
        )
    }

    async fn update(&self, path: &CollectionPath, id: &str, fields: Document) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        apply(
            &mut collections,
            WriteOp::Update {
                path: path.clone(),
                id: id.to_string(),
                fields,
            },
        )
    }

    async fn update_if(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        allowed: &[Bson],
        fields: Document,
    ) -> Result<bool, StoreError> {
        let mut collections = self.lock()?;
        if take_one(&self.update_failures) {
            return Err(StoreError::Unavailable(
                "simulated guarded update failure".to_string(),
            ));
        }
        let existing = collections
            .get_mut(&path.to_string())
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(path, id))?;

        let current = existing.get(field).cloned().unwrap_or(Bson::Null);
        if !allowed.contains(&current) {
            return Ok(false);
        }
        for (key, value) in fields {
            existing.insert(key, value);
        }
        Ok(true)
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        apply(
            &mut collections,
            WriteOp::Delete {
                path: path.clone(),
                id: id.to_string(),
            },
        )
    }

    async fn query(&self, path: &CollectionPath, spec: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let collections = self.lock()?;
        let Some(collection) = collections.get(&path.to_string()) else {
            return Ok(Vec::new());
        };

        let mut docs: Vec<Document> = collection
            .values()
            .filter(|doc| match &spec.filter {
                Some((field, value)) => doc.get(field).unwrap_or(&Bson::Null) == value,
                None => true,
            })
            .cloned()
            .collect();

        if !spec.order_by.is_empty() {
            docs.sort_by(|a, b| {
                spec.order_by.iter().fold(Ordering::Equal, |acc, (field, order)| {
                    acc.then_with(|| {
                        let ord = compare_bson(a.get(field), b.get(field));
                        match order {
                            SortOrder::Ascending => ord,
                            SortOrder::Descending => ord.reverse(),
                        }
                    })
                })
            });
        }
        if let Some(limit) = spec.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        if self.commits_fail.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::BatchAborted(
                "simulated commit failure".to_string(),
            ));
        }

        let mut staged = collections.clone();
        for op in batch.into_ops() {
            apply(&mut staged, op).map_err(|e| StoreError::BatchAborted(e.to_string()))?;
        }
        *collections = staged;
        let armed = self.armed_update_failures.swap(0, AtomicOrdering::SeqCst);
        self.update_failures.fetch_add(armed, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn jobs() -> CollectionPath {
        CollectionPath::root("jobs")
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store = MemoryStore::new();
        let a = CollectionPath::root("tx").scoped("owner_id", "a");
        let b = CollectionPath::root("tx").scoped("owner_id", "b");

        store.set(&a, "1", doc! { "v": 1 }).await.unwrap();

        assert!(store.get(&a, "1").await.unwrap().is_some());
        assert!(store.get(&b, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(&jobs(), "a", doc! { "v": 1 });
        batch.update(&jobs(), "missing", doc! { "v": 2 });

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchAborted(_)));
        assert_eq!(store.count(&jobs()), 0);
    }

    #[tokio::test]
    async fn insert_never_overwrites() {
        let store = MemoryStore::new();

        assert!(store.insert(&jobs(), "j", doc! { "v": 1 }).await.unwrap());
        assert!(!store.insert(&jobs(), "j", doc! { "v": 2 }).await.unwrap());
        assert_eq!(
            store.get(&jobs(), "j").await.unwrap().unwrap().get_i32("v").unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn guarded_update_respects_allowed_values() {
        let store = MemoryStore::new();
        store.set(&jobs(), "j", doc! { "status": "completed" }).await.unwrap();

        let applied = store
            .update_if(&jobs(), "j", "status", &["pending".into(), "processing".into()], doc! { "status": "failed" })
            .await
            .unwrap();
        assert!(!applied);

        let applied = store
            .update_if(&jobs(), "j", "missing_field", &[Bson::Null], doc! { "status": "failed" })
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(
            store.get(&jobs(), "j").await.unwrap().unwrap().get_str("status").unwrap(),
            "failed"
        );
    }

    #[tokio::test]
    async fn query_filters_sorts_and_limits() {
        let store = MemoryStore::new();
        for (id, owner, rank) in [("1", "a", 3), ("2", "b", 1), ("3", "a", 2), ("4", "a", 5)] {
            store
                .set(&jobs(), id, doc! { "owner_id": owner, "rank": rank })
                .await
                .unwrap();
        }

        let docs = store
            .query(
                &jobs(),
                &QuerySpec::all()
                    .where_eq("owner_id", "a")
                    .order_by("rank", SortOrder::Descending)
                    .limit(2),
            )
            .await
            .unwrap();

        let ranks: Vec<i32> = docs.iter().map(|d| d.get_i32("rank").unwrap()).collect();
        assert_eq!(ranks, vec![5, 3]);
    }

    #[tokio::test]
    async fn later_sort_keys_break_ties() {
        let store = MemoryStore::new();
        for (id, day, line) in [("a", "2024-01-04", 0), ("b", "2024-01-04", 2), ("c", "2024-01-05", 1), ("d", "2024-01-04", 1)] {
            store
                .set(&jobs(), id, doc! { "name": id, "day": day, "line": line })
                .await
                .unwrap();
        }

        let docs = store
            .query(
                &jobs(),
                &QuerySpec::all()
                    .order_by("day", SortOrder::Descending)
                    .then_by("line", SortOrder::Descending),
            )
            .await
            .unwrap();

        let names: Vec<&str> = docs.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["c", "b", "d", "a"]);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);
        let err = store.get(&jobs(), "x").await.unwrap_err();
        assert!(err.is_transient());
    }
}
