//! Exports of store state to sheets

use recon_common::Result;

use crate::models::{EnrichmentRecord, HistorySet};
use crate::sheet::Sheet;
use crate::store::DocumentStore;

/// Phone columns written by `enrichment_sheet`
pub const EXPORT_PHONE_COLUMNS: usize = 14;

/// One sorted `cpf` row per identifier in the mirror
pub fn history_sheet(history: &HistorySet) -> Sheet {
    let rows = history
        .sorted()
        .into_iter()
        .map(|id| vec![id.into_string()])
        .collect();
    Sheet::with_rows("historico", vec!["cpf".to_string()], rows)
}

/// Every enrichment record as `cpf, fone1..fone14`, in key order
///
/// Phones beyond the fourteenth are dropped.
pub async fn enrichment_sheet(store: &dyn DocumentStore, collection: &str, page_size: usize) -> Result<Sheet> {
    let page_size = page_size.max(1);
    let mut headers = vec!["cpf".to_string()];
    headers.extend((1..=EXPORT_PHONE_COLUMNS).map(|i| format!("fone{}", i)));
    let mut sheet = Sheet::new("enriquecidos", headers);

    let mut after: Option<String> = None;
    loop {
        let page = store.scan_page(collection, after.as_deref(), page_size).await?;
        let fetched = page.len();
        for (key, doc) in page {
            let mut row = vec![key.clone()];
            row.extend(EnrichmentRecord::phones_of(&doc).into_iter().take(EXPORT_PHONE_COLUMNS));
            row.resize(EXPORT_PHONE_COLUMNS + 1, String::new());
            sheet.push_row(row);
            after = Some(key);
        }
        if fetched < page_size {
            break;
        }
        tokio::task::yield_now().await;
    }

    tracing::debug!(collection, rows = sheet.row_count(), "Exported enrichment collection");
    Ok(sheet)
}
