//! In-process document store
//!
//! Used by tests and for dry runs. Supports failure injection so callers'
//! chunk-level error handling can be exercised.

use super::{check_batch, check_in_query, merge_documents, Document, DocumentStore, StoreLimits};
use async_trait::async_trait;
use recon_common::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Collection = BTreeMap<String, Document>;

#[derive(Default)]
struct FailurePlan {
    /// Fail the n-th upsert call (1-based, counted across collections)
    upsert_calls: Vec<usize>,
    query_in_calls: Vec<usize>,
    scans: bool,
}

/// `BTreeMap`-backed store with optional injected failures
#[derive(Default)]
pub struct MemoryStore {
    limits: StoreLimits,
    collections: Mutex<HashMap<String, Collection>>,
    failures: Mutex<FailurePlan>,
    upserts: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Make the given upsert calls (1-based) fail with `RemoteUnavailable`
    pub fn fail_upsert_calls(&self, calls: &[usize]) {
        if let Ok(mut plan) = self.failures.lock() {
            plan.upsert_calls = calls.to_vec();
        }
    }

    /// Make the given `query_in` calls (1-based) fail
    pub fn fail_query_in_calls(&self, calls: &[usize]) {
        if let Ok(mut plan) = self.failures.lock() {
            plan.query_in_calls = calls.to_vec();
        }
    }

    /// Make every scan fail
    pub fn fail_scans(&self, fail: bool) {
        if let Ok(mut plan) = self.failures.lock() {
            plan.scans = fail;
        }
    }

    /// Number of upsert calls seen so far
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Snapshot of one document
    pub fn get(&self, collection: &str, key: &str) -> Option<Document> {
        self.collections
            .lock()
            .ok()?
            .get(collection)?
            .get(key)
            .cloned()
    }

    fn should_fail(&self, pick: impl Fn(&FailurePlan) -> bool) -> bool {
        self.failures.lock().map(|plan| pick(&plan)).unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .lock()
            .map_err(|_| Error::Internal("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn limits(&self) -> StoreLimits {
        self.limits
    }

    async fn batch_upsert(&self, collection: &str, docs: &[(String, Document)], merge: bool) -> Result<()> {
        check_batch(self.limits, docs.len())?;
        let call = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_fail(|plan| plan.upsert_calls.contains(&call)) {
            return Err(Error::RemoteUnavailable(format!("Injected failure on upsert call {}", call)));
        }

        let mut collections = self.lock()?;
        let target = collections.entry(collection.to_string()).or_default();
        for (key, doc) in docs {
            match target.get_mut(key) {
                Some(existing) if merge => merge_documents(existing, doc),
                _ => {
                    target.insert(key.clone(), doc.clone());
                }
            }
        }
        Ok(())
    }

    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()> {
        check_batch(self.limits, keys.len())?;
        let mut collections = self.lock()?;
        if let Some(target) = collections.get_mut(collection) {
            for key in keys {
                target.remove(key);
            }
        }
        Ok(())
    }

    async fn query_in(&self, collection: &str, keys: &[String]) -> Result<Vec<(String, Document)>> {
        check_in_query(self.limits, keys.len())?;
        let call = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_fail(|plan| plan.query_in_calls.contains(&call)) {
            return Err(Error::RemoteUnavailable(format!("Injected failure on lookup call {}", call)));
        }

        let collections = self.lock()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| target.get(key).map(|doc| (key.clone(), doc.clone())))
            .collect())
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<(String, Document)>> {
        let collections = self.lock()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(target
            .iter()
            .filter(|(_, doc)| matches!(doc.get(field), Some(Value::String(v)) if v == value))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect())
    }

    async fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<(String, Document)>> {
        if self.should_fail(|plan| plan.scans) {
            return Err(Error::RemoteUnavailable("Injected scan failure".to_string()));
        }

        let collections = self.lock()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let page = match after {
            Some(after) => target
                .range::<str, _>((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .take(limit)
                .map(|(k, d)| (k.clone(), d.clone()))
                .collect(),
            None => target
                .iter()
                .take(limit)
                .map(|(k, d)| (k.clone(), d.clone()))
                .collect(),
        };
        Ok(page)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.lock()?;
        Ok(collections.get(collection).map(|c| c.len() as u64).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_merge_and_replace() {
        let store = MemoryStore::new();
        store
            .batch_upsert("c", &[("k".into(), doc(json!({"a": 1, "b": 2})))], false)
            .await
            .unwrap();
        store
            .batch_upsert("c", &[("k".into(), doc(json!({"a": 9})))], true)
            .await
            .unwrap();
        assert_eq!(store.get("c", "k").unwrap(), doc(json!({"a": 9, "b": 2})));

        store
            .batch_upsert("c", &[("k".into(), doc(json!({"a": 5})))], false)
            .await
            .unwrap();
        assert_eq!(store.get("c", "k").unwrap(), doc(json!({"a": 5})));
    }

    #[tokio::test]
    async fn test_scan_pages_in_key_order() {
        let store = MemoryStore::new();
        let docs: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|k| (k.to_string(), Document::new()))
            .collect();
        store.batch_upsert("col", &docs, false).await.unwrap();

        let first = store.scan_page("col", None, 2).await.unwrap();
        assert_eq!(first.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        let second = store.scan_page("col", Some("b"), 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, "c");
    }

    #[tokio::test]
    async fn test_injected_upsert_failure() {
        let store = MemoryStore::new();
        store.fail_upsert_calls(&[2]);
        assert!(store.batch_upsert("c", &[], false).await.is_ok());
        assert!(matches!(
            store.batch_upsert("c", &[], false).await,
            Err(Error::RemoteUnavailable(_))
        ));
        assert!(store.batch_upsert("c", &[], false).await.is_ok());
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_query_eq_matches_string_field() {
        let store = MemoryStore::new();
        store
            .batch_upsert(
                "h",
                &[
                    ("1".into(), doc(json!({"batchId": "batch-1"}))),
                    ("2".into(), doc(json!({"batchId": "batch-2"}))),
                ],
                false,
            )
            .await
            .unwrap();
        let found = store.query_eq("h", "batchId", "batch-2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "2");
    }
}
