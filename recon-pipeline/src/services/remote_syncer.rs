//! Chunked synchronization with the document store
//!
//! Writes are split into chunks below the store's per-call limit and
//! committed one after another. Lookups use the smaller `max_in_keys` chunk.

use recon_common::identifier::digits_only;
use recon_common::time::{now, tag_with_prefix};
use recon_common::{Error, Identifier, Result};
use serde_json::{json, Value};

use crate::models::{CommitReport, DeleteOutcome, FeedSummary, HistorySet, PurgeSummary};
use crate::services::Reporter;
use crate::sheet::Sheet;
use crate::store::{Document, DocumentStore};

/// Field holding the commit tag on history documents
pub const BATCH_FIELD: &str = "batchId";
/// Tag prefix of root feed chunks
pub const ROOT_FEED_PREFIX: &str = "raiz-feed";

pub const DEFAULT_WRITE_CHUNK: usize = 499;
pub const DEFAULT_DELETE_CHUNK: usize = 500;

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

pub struct RemoteSyncer<'a> {
    store: &'a dyn DocumentStore,
    reporter: &'a Reporter,
    write_chunk: usize,
    delete_chunk: usize,
}

impl<'a> RemoteSyncer<'a> {
    pub fn new(store: &'a dyn DocumentStore, reporter: &'a Reporter) -> Self {
        Self {
            store,
            reporter,
            write_chunk: DEFAULT_WRITE_CHUNK,
            delete_chunk: DEFAULT_DELETE_CHUNK,
        }
    }

    /// Override chunk sizes; both are bounded by the store's write limit
    pub fn with_chunks(mut self, write_chunk: usize, delete_chunk: usize) -> Self {
        self.write_chunk = write_chunk;
        self.delete_chunk = delete_chunk;
        self
    }

    /// Upsert chunks stay strictly below the per-call write limit
    fn write_chunk_size(&self) -> usize {
        let limit = self.store.limits().max_batch_writes;
        self.write_chunk.clamp(1, limit.saturating_sub(1).max(1))
    }

    /// Delete chunks may use the full per-call limit
    fn delete_chunk_size(&self) -> usize {
        self.delete_chunk.clamp(1, self.store.limits().max_batch_writes.max(1))
    }

    /// Write `ids` to the history collection tagged with `batch_id`
    ///
    /// Chunks commit sequentially and the mirror learns each chunk as soon
    /// as it lands. The first failed chunk stops the call; earlier chunks
    /// stay committed.
    pub async fn commit_new(
        &self,
        collection: &str,
        history: &mut HistorySet,
        ids: &[Identifier],
        batch_id: &str,
    ) -> Result<CommitReport> {
        let chunk_size = self.write_chunk_size();
        let total_chunks = ids.len().div_ceil(chunk_size);
        let mut report = CommitReport {
            batch_id: batch_id.to_string(),
            ..CommitReport::default()
        };

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            let added_at = now().to_rfc3339();
            let docs: Vec<(String, Document)> = chunk
                .iter()
                .map(|id| {
                    let doc = object(json!({
                        "numero": id.as_str(),
                        "adicionado_em": added_at,
                        BATCH_FIELD: batch_id,
                    }));
                    (id.to_string(), doc)
                })
                .collect();

            self.store
                .batch_upsert(collection, &docs, false)
                .await
                .map_err(|e| {
                    Error::RemoteUnavailable(format!(
                        "Commit chunk {}/{} of {} failed after {} identifiers: {}",
                        index + 1,
                        total_chunks,
                        batch_id,
                        report.committed,
                        e
                    ))
                })?;

            history.extend(chunk.iter().cloned());
            report.committed += chunk.len();
            report.chunks += 1;
            self.reporter.batch_progress("commit", index + 1, total_chunks);
        }

        self.reporter.info(format!(
            "Committed {} identifiers to '{}' in {} chunk(s) as {} (history now {})",
            report.committed,
            collection,
            report.chunks,
            batch_id,
            history.len()
        ));
        Ok(report)
    }

    /// Remove every history document tagged with `batch_id`
    pub async fn delete_batch(
        &self,
        collection: &str,
        history: &mut HistorySet,
        batch_id: &str,
    ) -> Result<DeleteOutcome> {
        let tagged = self.store.query_eq(collection, BATCH_FIELD, batch_id).await?;
        if tagged.is_empty() {
            self.reporter
                .warn(format!("No documents found for batch '{}'", batch_id));
            return Ok(DeleteOutcome::NotFound);
        }

        let keys: Vec<String> = tagged.into_iter().map(|(key, _)| key).collect();
        let chunk_size = self.delete_chunk_size();
        let total_chunks = keys.len().div_ceil(chunk_size);
        self.reporter.info(format!(
            "Deleting {} documents of batch '{}'",
            keys.len(),
            batch_id
        ));

        for (index, chunk) in keys.chunks(chunk_size).enumerate() {
            self.store.batch_delete(collection, chunk).await?;
            for key in chunk {
                history.remove(&Identifier::normalize(key));
            }
            self.reporter.batch_progress("delete", index + 1, total_chunks);
        }

        self.reporter.info(format!(
            "Batch '{}' deleted ({} documents); history now {}",
            batch_id,
            keys.len(),
            history.len()
        ));
        Ok(DeleteOutcome::Deleted { count: keys.len() })
    }

    /// Delete every document of `collection` and empty the mirror
    ///
    /// Pages of `delete_chunk` keys are read from the front of the collection
    /// and deleted until none remain. A failed chunk stops the purge; keys
    /// deleted before it are already gone from the mirror.
    pub async fn purge_collection(&self, collection: &str, history: &mut HistorySet) -> Result<PurgeSummary> {
        let chunk_size = self.delete_chunk_size();
        let mut summary = PurgeSummary {
            mirror_cleared: history.len(),
            ..PurgeSummary::default()
        };
        self.reporter
            .info(format!("Purging '{}' in chunks of {}", collection, chunk_size));

        loop {
            let page = self.store.scan_page(collection, None, chunk_size).await?;
            if page.is_empty() {
                break;
            }
            let keys: Vec<String> = page.into_iter().map(|(key, _)| key).collect();
            self.store.batch_delete(collection, &keys).await.map_err(|e| {
                Error::RemoteUnavailable(format!(
                    "Purge of '{}' stopped after {} documents: {}",
                    collection, summary.deleted, e
                ))
            })?;
            for key in &keys {
                history.remove(&Identifier::normalize(key));
            }
            summary.deleted += keys.len();
            summary.chunks += 1;
            self.reporter
                .info(format!("{} documents deleted from '{}'", summary.deleted, collection));
            tokio::task::yield_now().await;
        }

        history.clear();
        self.reporter.info(format!(
            "'{}' purged: {} documents in {} chunk(s)",
            collection, summary.deleted, summary.chunks
        ));
        Ok(summary)
    }

    /// Add to `collection` the keys it does not hold yet
    ///
    /// A failed lookup chunk is logged and its keys are not written; a failed
    /// write chunk is logged and the next chunk still runs.
    pub async fn feed_reference_collection(
        &self,
        collection: &str,
        keys: &[String],
        source_tag: &str,
    ) -> FeedSummary {
        let mut summary = FeedSummary {
            checked: keys.len(),
            ..FeedSummary::default()
        };
        if keys.is_empty() {
            return summary;
        }

        let lookup_chunk = self.store.limits().max_in_keys.max(1);
        let mut new_keys = Vec::new();
        for chunk in keys.chunks(lookup_chunk) {
            match self.store.query_in(collection, chunk).await {
                Ok(found) => {
                    let existing: std::collections::HashSet<&str> =
                        found.iter().map(|(key, _)| key.as_str()).collect();
                    summary.already_present += existing.len();
                    new_keys.extend(chunk.iter().filter(|k| !existing.contains(k.as_str())).cloned());
                }
                Err(e) => {
                    summary.failed_chunks += 1;
                    self.reporter
                        .error(format!("Existence check of {} keys failed: {}", chunk.len(), e));
                }
            }
        }

        if new_keys.is_empty() {
            self.reporter.info("No new keys to add in this chunk");
            return summary;
        }
        self.reporter
            .info(format!("{} new keys found; writing to '{}'", new_keys.len(), collection));

        let write_chunk = self.write_chunk_size();
        for chunk in new_keys.chunks(write_chunk) {
            let lote_id = tag_with_prefix(ROOT_FEED_PREFIX);
            let added_at = now().to_rfc3339();
            let docs: Vec<(String, Document)> = chunk
                .iter()
                .map(|key| {
                    let doc = object(json!({
                        "adicionado_em": added_at,
                        "fonte": source_tag,
                        "lote_id": lote_id,
                    }));
                    (key.clone(), doc)
                })
                .collect();

            match self.store.batch_upsert(collection, &docs, false).await {
                Ok(()) => {
                    summary.written += chunk.len();
                    self.reporter
                        .info(format!("Chunk of {} keys saved to '{}' ({})", chunk.len(), collection, lote_id));
                }
                Err(e) => {
                    summary.failed_chunks += 1;
                    self.reporter
                        .error(format!("Saving chunk of {} keys to '{}' failed: {}", chunk.len(), collection, e));
                }
            }
        }

        summary
    }

    /// Feed every root key of a sheet, flushing every `read_batch` unique keys
    pub async fn feed_from_sheet(
        &self,
        collection: &str,
        sheet: &Sheet,
        source_tag: &str,
        read_batch: usize,
    ) -> Result<FeedSummary> {
        let keys = read_root_keys(sheet)?;
        let mut summary = FeedSummary::default();
        let read_batch = read_batch.max(1);
        let flushes = keys.len().div_ceil(read_batch);

        for (index, chunk) in keys.chunks(read_batch).enumerate() {
            self.reporter.info(format!(
                "Checking read batch {}/{} ({} keys)",
                index + 1,
                flushes,
                chunk.len()
            ));
            summary.absorb(&self.feed_reference_collection(collection, chunk, source_tag).await);
        }
        Ok(summary)
    }
}

/// Unique digits-only keys of length 11 or 14 from the `cpf`/`cnpj` column
pub fn read_root_keys(sheet: &Sheet) -> Result<Vec<String>> {
    let col = sheet.header_any(&["cpf", "cnpj"])?;
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();

    for row in 0..sheet.row_count() {
        let key = digits_only(sheet.get(row, col));
        if (key.len() == 11 || key.len() == 14) && seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    Ok(keys)
}
