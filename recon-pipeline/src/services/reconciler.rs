//! Row filtering and cleaning
//!
//! Rows are visited in source order and retained rows keep that order. For
//! each row: drop on a history hit, then on a root-set hit of the destination
//! key, then blank every phone cell holding exactly ten digits.

use recon_common::{Identifier, Result};
use std::collections::HashSet;

use crate::models::{CleanCounters, HistorySet, ReferenceSet};
use crate::services::reporter::percent;
use crate::sheet::{ColumnRef, Sheet};

/// Rows between cooperative yields and progress reports
pub const YIELD_EVERY: usize = 2000;

pub struct CleanOptions<'a> {
    pub root: &'a ReferenceSet,
    /// Column holding the root dedup key
    pub destination: &'a ColumnRef,
    pub identifier_header: &'a str,
    pub phone_prefix: &'a str,
    pub check_history: bool,
    /// Collect identifiers not yet in history
    pub persist: bool,
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub sheet: Sheet,
    pub counters: CleanCounters,
    /// Unique, in first-seen order
    pub newly_seen: Vec<Identifier>,
}

/// Malformed short numbers: exactly ten ASCII digits after trimming
pub fn is_ten_digit_phone(value: &str) -> bool {
    let value = value.trim();
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Identifier of a cell; `None` when it holds no digits
fn identifier_of(cell: &str) -> Option<Identifier> {
    if cell.chars().any(|c| c.is_ascii_digit()) {
        Some(Identifier::normalize(cell))
    } else {
        None
    }
}

struct NewlySeen {
    seen: HashSet<Identifier>,
    ordered: Vec<Identifier>,
}

impl NewlySeen {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            ordered: Vec::new(),
        }
    }

    fn add(&mut self, id: Identifier) {
        if self.seen.insert(id.clone()) {
            self.ordered.push(id);
        }
    }
}

/// Clean pass over one sheet
///
/// Fails with `ColumnNotFound` when the identifier column (or a header-named
/// destination column) is missing; the caller skips the file.
pub async fn reconcile(
    sheet: Sheet,
    history: &HistorySet,
    opts: &CleanOptions<'_>,
    progress: impl Fn(u8),
) -> Result<CleanOutcome> {
    let id_col = sheet.header(opts.identifier_header)?;
    let dest_col = opts.destination.resolve(&sheet)?;
    let phone_cols = sheet.columns_with_prefix(opts.phone_prefix);

    let total = sheet.row_count();
    let name = sheet.name().to_string();
    let headers = sheet.headers().to_vec();

    let mut counters = CleanCounters::default();
    let mut newly_seen = NewlySeen::new();
    let mut retained = Vec::with_capacity(total);

    for (i, mut row) in sheet.into_rows().into_iter().enumerate() {
        let key = row.get(dest_col).map(|v| v.trim()).unwrap_or("").to_string();
        let identifier = row.get(id_col).and_then(|v| identifier_of(v));

        if opts.check_history && identifier.as_ref().is_some_and(|id| history.contains(id)) {
            counters.duplicate += 1;
        } else if !key.is_empty() && opts.root.contains(&key) {
            counters.removed_by_root += 1;
        } else {
            for &col in &phone_cols {
                if let Some(cell) = row.get_mut(col) {
                    if is_ten_digit_phone(cell) {
                        cell.clear();
                        counters.cleaned_phone += 1;
                    }
                }
            }
            retained.push(row);

            if opts.persist {
                if let Some(id) = identifier {
                    if !history.contains(&id) {
                        newly_seen.add(id);
                    }
                }
            }
        }

        if (i + 1) % YIELD_EVERY == 0 {
            progress(percent(i + 1, total));
            tokio::task::yield_now().await;
        }
    }

    counters.total_retained = retained.len();
    progress(100);

    Ok(CleanOutcome {
        sheet: Sheet::with_rows(name, headers, retained),
        counters,
        newly_seen: newly_seen.ordered,
    })
}

/// History-only pass: drop rows already in history, keep everything else
///
/// With `persist`, every retained identifier is reported as newly seen.
pub async fn clean_by_history(
    sheet: Sheet,
    history: &HistorySet,
    identifier_header: &str,
    persist: bool,
) -> Result<CleanOutcome> {
    let id_col = sheet.header(identifier_header)?;
    let name = sheet.name().to_string();
    let headers = sheet.headers().to_vec();

    let mut counters = CleanCounters::default();
    let mut newly_seen = NewlySeen::new();
    let mut retained = Vec::new();

    for (i, row) in sheet.into_rows().into_iter().enumerate() {
        let identifier = row.get(id_col).and_then(|v| identifier_of(v));
        if identifier.as_ref().is_some_and(|id| history.contains(id)) {
            counters.duplicate += 1;
            continue;
        }
        if persist {
            if let Some(id) = identifier {
                newly_seen.add(id);
            }
        }
        retained.push(row);

        if (i + 1) % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }

    counters.total_retained = retained.len();
    Ok(CleanOutcome {
        sheet: Sheet::with_rows(name, headers, retained),
        counters,
        newly_seen: newly_seen.ordered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options<'a>(root: &'a ReferenceSet, dest: &'a ColumnRef) -> CleanOptions<'a> {
        CleanOptions {
            root,
            destination: dest,
            identifier_header: "cpf",
            phone_prefix: "fone",
            check_history: true,
            persist: true,
        }
    }

    #[test]
    fn test_ten_digit_detection() {
        assert!(is_ten_digit_phone("1234567890"));
        assert!(is_ten_digit_phone(" 1234567890 "));
        assert!(!is_ten_digit_phone("551234567890"));
        assert!(!is_ten_digit_phone("(12)34567890"));
        assert!(!is_ten_digit_phone(""));
    }

    #[tokio::test]
    async fn test_history_wins_over_root() {
        let sheet = Sheet::from_strs("f", &["key", "cpf"], &[&["R1", "1"], &["R1", "2"], &["X", "3"]]);
        let root: ReferenceSet = vec!["R1".to_string()].into_iter().collect();
        let dest = ColumnRef::Letter("A".into());
        let history: HistorySet = [Identifier::normalize("1")].into_iter().collect();

        let out = reconcile(sheet, &history, &options(&root, &dest), |_| {}).await.unwrap();
        assert_eq!(out.counters.duplicate, 1);
        assert_eq!(out.counters.removed_by_root, 1);
        assert_eq!(out.counters.total_retained, 1);
        assert_eq!(out.newly_seen, vec![Identifier::normalize("3")]);
    }

    #[tokio::test]
    async fn test_history_check_disabled_keeps_known_rows() {
        let sheet = Sheet::from_strs("f", &["key", "cpf"], &[&["", "1"]]);
        let root = ReferenceSet::new();
        let dest = ColumnRef::Letter("A".into());
        let history: HistorySet = [Identifier::normalize("1")].into_iter().collect();
        let mut opts = options(&root, &dest);
        opts.check_history = false;

        let out = reconcile(sheet, &history, &opts, |_| {}).await.unwrap();
        assert_eq!(out.counters.total_retained, 1);
        // Known identifiers are never reported as new
        assert!(out.newly_seen.is_empty());
    }

    #[tokio::test]
    async fn test_missing_identifier_column() {
        let sheet = Sheet::from_strs("f", &["cnpj"], &[&["1"]]);
        let root = ReferenceSet::new();
        let dest = ColumnRef::Letter("A".into());
        let result = reconcile(sheet, &HistorySet::new(), &options(&root, &dest), |_| {}).await;
        assert!(matches!(result, Err(recon_common::Error::ColumnNotFound(_))));
    }

    #[tokio::test]
    async fn test_progress_reported_on_large_sheets() {
        let rows: Vec<Vec<String>> = (0..4500).map(|i| vec![i.to_string()]).collect();
        let sheet = Sheet::with_rows("big", vec!["cpf".to_string()], rows);
        let root = ReferenceSet::new();
        let dest = ColumnRef::Letter("B".into());
        let reports = std::sync::Mutex::new(Vec::new());

        let out = reconcile(sheet, &HistorySet::new(), &options(&root, &dest), |p| {
            reports.lock().unwrap().push(p)
        })
        .await
        .unwrap();

        assert_eq!(out.counters.total_retained, 4500);
        assert_eq!(*reports.lock().unwrap(), vec![44, 88, 100]);
    }

    #[tokio::test]
    async fn test_clean_by_history() {
        let sheet = Sheet::from_strs("f", &["CPF"], &[&["1"], &["2"], &[""], &["2"]]);
        let history: HistorySet = [Identifier::normalize("1")].into_iter().collect();

        let out = clean_by_history(sheet, &history, "cpf", true).await.unwrap();
        assert_eq!(out.counters.duplicate, 1);
        assert_eq!(out.counters.total_retained, 3);
        assert_eq!(out.newly_seen, vec![Identifier::normalize("2")]);
    }
}
