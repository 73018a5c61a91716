//! Reference set loading
//!
//! Root sets come from a sheet column or a full scan of the root collection;
//! the history set comes from the history collection and degrades to empty
//! when the store cannot be read.

use recon_common::{Identifier, Result};
use tracing::debug;

use crate::models::{HistorySet, ReferenceSet};
use crate::services::Reporter;
use crate::sheet::{ColumnRef, Sheet};
use crate::store::DocumentStore;

fn non_empty_trimmed<'a>(cells: impl Iterator<Item = &'a str>) -> ReferenceSet {
    cells
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Non-empty trimmed values of every data row under `header`
pub fn load_from_column(sheet: &Sheet, header: &str) -> Result<ReferenceSet> {
    let col = sheet.header(header)?;
    Ok(non_empty_trimmed((0..sheet.row_count()).map(|row| sheet.get(row, col))))
}

/// Same as `load_from_column`, by letter or header
///
/// A letter column also takes the header cell: root files often have no
/// header row at all.
pub fn load_from_column_ref(sheet: &Sheet, column: &ColumnRef) -> Result<ReferenceSet> {
    match column {
        ColumnRef::Header(name) => load_from_column(sheet, name),
        ColumnRef::Letter(_) => {
            let col = column.resolve(sheet)?;
            let header = sheet.headers().get(col).map(String::as_str).unwrap_or("");
            let cells = std::iter::once(header).chain((0..sheet.row_count()).map(|row| sheet.get(row, col)));
            Ok(non_empty_trimmed(cells))
        }
    }
}

/// Every document key of `collection`, read page by page
pub async fn scan_keys(store: &dyn DocumentStore, collection: &str, page_size: usize) -> Result<Vec<String>> {
    let page_size = page_size.max(1);
    let mut keys = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let page = store.scan_page(collection, after.as_deref(), page_size).await?;
        let fetched = page.len();
        keys.extend(page.into_iter().map(|(key, _)| key));
        debug!(collection, fetched, total = keys.len(), "Scanned page");

        if fetched < page_size {
            break;
        }
        after = keys.last().cloned();
        tokio::task::yield_now().await;
    }

    Ok(keys)
}

/// Root set from all keys of a remote collection
pub async fn load_from_remote(store: &dyn DocumentStore, collection: &str, page_size: usize) -> Result<ReferenceSet> {
    Ok(scan_keys(store, collection, page_size).await?.into_iter().collect())
}

/// History mirror from the history collection; never fails
pub async fn load_history(
    store: &dyn DocumentStore,
    collection: &str,
    page_size: usize,
    reporter: &Reporter,
) -> HistorySet {
    match scan_keys(store, collection, page_size).await {
        Ok(keys) => {
            let history: HistorySet = keys.iter().map(|k| Identifier::normalize(k)).collect();
            reporter.info(format!(
                "History loaded from '{}': {} identifiers",
                collection,
                history.len()
            ));
            history
        }
        Err(e) => {
            reporter.warn(format!(
                "Could not load history from '{}' ({}); continuing without history dedup",
                collection, e
            ));
            HistorySet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStore};

    #[test]
    fn test_load_from_column_skips_blanks() {
        let sheet = Sheet::from_strs("root", &["Chave"], &[&[" A1 "], &[""], &["B2"], &["A1"]]);
        let set = load_from_column(&sheet, "chave").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("A1"));
    }

    #[test]
    fn test_load_from_missing_column() {
        let sheet = Sheet::from_strs("root", &["x"], &[]);
        assert!(matches!(
            load_from_column(&sheet, "cpf"),
            Err(recon_common::Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_letter_column_includes_header_cell() {
        let sheet = Sheet::from_strs("root", &["111"], &[&["222"], &["333"]]);
        let set = load_from_column_ref(&sheet, &ColumnRef::Letter("A".into())).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("111"));
    }

    #[tokio::test]
    async fn test_remote_scan_crosses_pages() {
        let store = MemoryStore::new();
        let docs: Vec<(String, Document)> = (0..25).map(|i| (format!("{:03}", i), Document::new())).collect();
        store.batch_upsert("Raiz", &docs, false).await.unwrap();

        let set = load_from_remote(&store, "Raiz", 10).await.unwrap();
        assert_eq!(set.len(), 25);
        assert!(set.contains("024"));
    }

    #[tokio::test]
    async fn test_history_failure_degrades_to_empty() {
        let store = MemoryStore::new();
        store
            .batch_upsert("h", &[("1".to_string(), Document::new())], false)
            .await
            .unwrap();
        store.fail_scans(true);

        let history = load_history(&store, "h", 10, &Reporter::silent()).await;
        assert!(history.is_empty());
    }
}
