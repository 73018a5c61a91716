//! Document key-value store
//!
//! Collections of JSON documents addressed by string key. Writes go in
//! bounded batches, each applied atomically; membership lookups take at most
//! `max_in_keys` keys per call, so callers chunk.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use recon_common::{Error, Result};
use serde_json::{Map, Value};

/// Document body: a JSON object
pub type Document = Map<String, Value>;

/// Per-call limits advertised by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Documents per batched upsert/delete
    pub max_batch_writes: usize,
    /// Keys per `query_in`
    pub max_in_keys: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_batch_writes: 500,
            max_in_keys: 30,
        }
    }
}

impl From<&recon_common::config::StoreConfig> for StoreLimits {
    fn from(config: &recon_common::config::StoreConfig) -> Self {
        Self {
            max_batch_writes: config.max_batch_writes,
            max_in_keys: config.max_in_keys,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn limits(&self) -> StoreLimits;

    /// Write a batch atomically; `merge` keeps fields absent from the new document
    async fn batch_upsert(&self, collection: &str, docs: &[(String, Document)], merge: bool) -> Result<()>;

    /// Delete a batch of keys atomically (missing keys are ignored)
    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()>;

    /// Documents whose key is in `keys`
    async fn query_in(&self, collection: &str, keys: &[String]) -> Result<Vec<(String, Document)>>;

    /// Documents whose top-level `field` equals the string `value`
    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<(String, Document)>>;

    /// Up to `limit` documents with key > `after`, ordered by key
    async fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<(String, Document)>>;

    async fn count(&self, collection: &str) -> Result<u64>;
}

/// Reject a write batch above the store limit
pub(crate) fn check_batch(limits: StoreLimits, len: usize) -> Result<()> {
    if len > limits.max_batch_writes {
        return Err(Error::InvalidInput(format!(
            "Batch of {} exceeds the {} writes per call limit",
            len, limits.max_batch_writes
        )));
    }
    Ok(())
}

/// Reject an `in` query above the store limit
pub(crate) fn check_in_query(limits: StoreLimits, len: usize) -> Result<()> {
    if len > limits.max_in_keys {
        return Err(Error::InvalidInput(format!(
            "Query of {} keys exceeds the {} keys per lookup limit",
            len, limits.max_in_keys
        )));
    }
    Ok(())
}

/// Field-level merge: top-level fields of `incoming` replace those of `existing`
pub fn merge_documents(existing: &mut Document, incoming: &Document) {
    for (field, value) in incoming {
        existing.insert(field.clone(), value.clone());
    }
}
