//! Phone column housekeeping

use crate::sheet::Sheet;

/// Shift each row's non-empty phone values to the leftmost phone columns
///
/// Returns the number of data rows visited; `None` when the sheet has no
/// phone columns.
pub fn compact_phones(sheet: &mut Sheet, phone_prefix: &str) -> Option<usize> {
    let phone_cols = sheet.columns_with_prefix(phone_prefix);
    if phone_cols.is_empty() {
        return None;
    }

    let rows = sheet.row_count();
    for row in 0..rows {
        let values: Vec<String> = phone_cols
            .iter()
            .map(|&col| sheet.get(row, col))
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .collect();

        let mut values = values.into_iter();
        for &col in &phone_cols {
            let value = values.next().unwrap_or_default();
            // Avoid widening short rows with trailing blanks
            if value.is_empty() && sheet.get(row, col).is_empty() {
                continue;
            }
            sheet.set(row, col, value);
        }
    }
    Some(rows)
}

/// Append any missing `<prefix>1..<prefix>N` headers; returns how many were added
pub fn ensure_phone_headers(sheet: &mut Sheet, phone_prefix: &str, count: usize) -> usize {
    let mut added = 0;
    for i in 1..=count {
        let name = format!("{}{}", phone_prefix, i);
        if sheet.header(&name).is_err() {
            let col = sheet.column_count();
            sheet.set_header(col, &name);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_shifts_left() {
        let mut sheet = Sheet::from_strs(
            "f",
            &["cpf", "fone1", "fone2", "fone3"],
            &[&["1", "", "a", "b"], &["2", "x", " ", "y"], &["3"]],
        );
        assert_eq!(compact_phones(&mut sheet, "fone"), Some(3));

        assert_eq!(&sheet.rows()[0][1..], &["a", "b", ""]);
        assert_eq!(&sheet.rows()[1][1..], &["x", "y", ""]);
        assert_eq!(sheet.rows()[2].len(), 1);
    }

    #[test]
    fn test_compact_without_phone_columns() {
        let mut sheet = Sheet::from_strs("f", &["cpf"], &[&["1"]]);
        assert_eq!(compact_phones(&mut sheet, "fone"), None);
    }

    #[test]
    fn test_ensure_headers_adds_only_missing() {
        let mut sheet = Sheet::from_strs("f", &["cpf", "Fone2"], &[&["1", "x"]]);
        let added = ensure_phone_headers(&mut sheet, "fone", 3);
        assert_eq!(added, 2);
        assert_eq!(sheet.headers(), &["cpf", "Fone2", "fone1", "fone3"]);
        assert_eq!(ensure_phone_headers(&mut sheet, "fone", 3), 0);
    }
}
