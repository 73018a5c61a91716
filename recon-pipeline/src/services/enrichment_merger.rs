//! Merging stored phones into sheet rows
//!
//! `merge` decides per row whether and how fetched phones land in the phone
//! cells; `enrich_sheet` drives it over a whole sheet in bounded batches of
//! store lookups and writes the status column.

use recon_common::{Identifier, Result};
use std::collections::{HashMap, HashSet};

use crate::models::{EnrichFileReport, EnrichmentRecord, MergeStrategy, STATUS_ENRICHED, STATUS_POOR};
use crate::services::reporter::percent;
use crate::services::Reporter;
use crate::sheet::Sheet;
use crate::store::DocumentStore;

pub const STATUS_HEADER: &str = "status";

/// Merge `fetched` into `cells` under `strategy`
///
/// Returns whether at least one cell was written. Empty `fetched` is a no-op.
pub fn merge(cells: &mut [String], fetched: &[String], strategy: MergeStrategy) -> bool {
    if fetched.is_empty() || cells.is_empty() {
        return false;
    }

    let filled = cells.iter().filter(|c| !c.trim().is_empty()).count();
    let applies = match strategy {
        MergeStrategy::Overwrite => true,
        MergeStrategy::Append => filled < cells.len(),
        MergeStrategy::Ignore => filled == 0,
    };
    if !applies {
        return false;
    }

    if strategy == MergeStrategy::Overwrite {
        cells.iter_mut().for_each(String::clear);
    }

    let mut phones = fetched.iter();
    let mut written = false;
    for cell in cells.iter_mut() {
        if !cell.trim().is_empty() {
            continue;
        }
        match phones.next() {
            Some(phone) => {
                *cell = phone.clone();
                written = true;
            }
            None => break,
        }
    }
    written
}

pub struct EnrichOptions<'a> {
    pub collection: &'a str,
    pub strategy: MergeStrategy,
    pub phone_prefix: &'a str,
    pub batch_rows: usize,
}

/// Enrich every row of `sheet` from the enrichment collection
///
/// Requires a `cpf`/`cnpj` column; creates `status` when absent. Rows
/// without identifier digits are left untouched.
pub async fn enrich_sheet(
    store: &dyn DocumentStore,
    sheet: &mut Sheet,
    opts: &EnrichOptions<'_>,
    reporter: &Reporter,
) -> Result<EnrichFileReport> {
    let id_col = sheet.header_any(&["cpf", "cnpj"])?;
    let status_col = sheet.ensure_column(STATUS_HEADER);
    let phone_cols = sheet.columns_with_prefix(opts.phone_prefix);
    let lookup_chunk = store.limits().max_in_keys.max(1);
    let batch_rows = opts.batch_rows.max(1);

    let total = sheet.row_count();
    let total_batches = total.div_ceil(batch_rows);
    let mut report = EnrichFileReport {
        file: sheet.name().to_string(),
        ..EnrichFileReport::default()
    };
    reporter.info(format!(
        "{}: {} rows in {} batch(es), strategy {}",
        report.file, total, total_batches, opts.strategy
    ));

    for (batch_index, start) in (0..total).step_by(batch_rows).enumerate() {
        let end = (start + batch_rows).min(total);
        let rows: Vec<(usize, Identifier)> = (start..end)
            .filter(|&row| sheet.get(row, id_col).chars().any(|c| c.is_ascii_digit()))
            .map(|row| (row, Identifier::normalize(sheet.get(row, id_col))))
            .collect();
        report.processed += end - start;
        if rows.is_empty() {
            continue;
        }

        let mut seen = HashSet::new();
        let keys: Vec<String> = rows
            .iter()
            .filter(|(_, id)| seen.insert(id.clone()))
            .map(|(_, id)| id.to_string())
            .collect();

        let mut found: HashMap<String, Vec<String>> = HashMap::new();
        for chunk in keys.chunks(lookup_chunk) {
            for (key, doc) in store.query_in(opts.collection, chunk).await? {
                found.insert(key, EnrichmentRecord::phones_of(&doc));
            }
        }

        for (row, id) in &rows {
            let enriched = match found.get(id.as_str()) {
                Some(phones) => {
                    let mut cells: Vec<String> =
                        phone_cols.iter().map(|&col| sheet.get(*row, col).to_string()).collect();
                    let applied = merge(&mut cells, phones, opts.strategy);
                    if applied {
                        for (&col, value) in phone_cols.iter().zip(cells) {
                            sheet.set(*row, col, value);
                        }
                    }
                    applied
                }
                None => {
                    report.not_found += 1;
                    false
                }
            };

            if enriched {
                report.enriched += 1;
            }
            sheet.set(*row, status_col, if enriched { STATUS_ENRICHED } else { STATUS_POOR });
        }

        reporter.batch_progress("enrich", batch_index + 1, total_batches);
        reporter.file_progress(&report.file, percent(end, total));
        tokio::task::yield_now().await;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_append_fills_empty_cells_only() {
        let mut row = cells(&["", "551199998888"]);
        let applied = merge(&mut row, &cells(&["5511111"]), MergeStrategy::Append);
        assert!(applied);
        assert_eq!(row, cells(&["5511111", "551199998888"]));
    }

    #[test]
    fn test_append_skips_full_rows() {
        let mut row = cells(&["1", "2"]);
        assert!(!merge(&mut row, &cells(&["3"]), MergeStrategy::Append));
        assert_eq!(row, cells(&["1", "2"]));
    }

    #[test]
    fn test_overwrite_clears_first() {
        let mut row = cells(&["a", "b", "c"]);
        assert!(merge(&mut row, &cells(&["x"]), MergeStrategy::Overwrite));
        assert_eq!(row, cells(&["x", "", ""]));
    }

    #[test]
    fn test_ignore_requires_empty_row() {
        let mut partial = cells(&["", "b"]);
        assert!(!merge(&mut partial, &cells(&["x"]), MergeStrategy::Ignore));

        let mut empty = cells(&["", ""]);
        assert!(merge(&mut empty, &cells(&["x", "y", "z"]), MergeStrategy::Ignore));
        assert_eq!(empty, cells(&["x", "y"]));
    }

    #[test]
    fn test_empty_fetch_is_noop() {
        let mut row = cells(&["a", ""]);
        for strategy in [MergeStrategy::Overwrite, MergeStrategy::Append, MergeStrategy::Ignore] {
            assert!(!merge(&mut row, &[], strategy));
        }
        assert_eq!(row, cells(&["a", ""]));
    }
}
