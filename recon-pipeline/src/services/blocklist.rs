//! Blocklist merge into the root reference file
//!
//! Both sheets are read as flat lists of values, header row included. The
//! result is a single column: root values first, then blocklist values not
//! already present, in reading order.

use std::collections::HashSet;

use crate::sheet::Sheet;

/// Non-empty cell values of `sheet`, header first, row by row
pub fn flatten_values(sheet: &Sheet) -> Vec<String> {
    sheet
        .headers()
        .iter()
        .chain(sheet.rows().iter().flatten())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Root values plus unseen blocklist values as a one-column sheet
///
/// Returns the merged sheet and how many blocklist values were added.
pub fn merge_blocklist(root: &Sheet, blocklist: &Sheet) -> (Sheet, usize) {
    let mut seen = HashSet::new();
    let mut values = Vec::new();

    for value in flatten_values(root) {
        if seen.insert(value.clone()) {
            values.push(value);
        }
    }
    let before = values.len();
    for value in flatten_values(blocklist) {
        if seen.insert(value.clone()) {
            values.push(value);
        }
    }
    let added = values.len() - before;

    let mut iter = values.into_iter();
    let header = iter.next().map(|v| vec![v]).unwrap_or_default();
    let rows = iter.map(|v| vec![v]).collect();
    (Sheet::with_rows(root.name(), header, rows), added)
}
