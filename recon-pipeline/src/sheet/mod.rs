//! In-memory tabular sheets
//!
//! A `Sheet` is a header row plus data rows of string cells. Reading past the
//! end of a short row yields an empty cell; writing past it extends the row.
//! File formats live behind the `TabularSource` trait.

mod csv_source;

pub use csv_source::{CsvSource, TabularSource};

use recon_common::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One worksheet: header row + data rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Convenience constructor for literal tables
    pub fn from_strs(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::with_rows(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Locate a header case-insensitively (surrounding whitespace ignored)
    pub fn header(&self, name: &str) -> Result<usize> {
        self.find_header(|h| h == name.trim().to_lowercase())
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// First header whose trimmed lowercase form satisfies `pred`
    pub fn find_header(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| pred(h.trim().to_lowercase().as_str()))
    }

    /// First header matching any of `names` (case-insensitive)
    pub fn header_any(&self, names: &[&str]) -> Result<usize> {
        self.find_header(|h| names.iter().any(|n| n.eq_ignore_ascii_case(h)))
            .ok_or_else(|| Error::ColumnNotFound(names.join("/")))
    }

    /// Indices of every header starting with `prefix` (case-insensitive), ascending
    pub fn columns_with_prefix(&self, prefix: &str) -> Vec<usize> {
        let prefix = prefix.to_lowercase();
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim().to_lowercase().starts_with(&prefix))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of `name`, appending the header if absent
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Ok(idx) = self.header(name) {
            return idx;
        }
        let idx = self.column_count();
        self.set_header(idx, name);
        idx
    }

    pub fn set_header(&mut self, col: usize, value: &str) {
        if self.headers.len() <= col {
            self.headers.resize(col + 1, String::new());
        }
        self.headers[col] = value.to_string();
    }

    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value.into();
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }
}

/// Column selector: spreadsheet letter or header name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// `A` = 0, `Z` = 25, `AA` = 26
    Letter(String),
    /// Case-insensitive header lookup
    Header(String),
}

impl ColumnRef {
    pub fn resolve(&self, sheet: &Sheet) -> Result<usize> {
        match self {
            ColumnRef::Letter(letter) => column_letter_to_index(letter),
            ColumnRef::Header(name) => sheet.header(name),
        }
    }
}

impl FromStr for ColumnRef {
    type Err = Error;

    /// `"B"` selects a letter, `"header:status"` selects a header
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("header:") {
            if name.trim().is_empty() {
                return Err(Error::InvalidInput("Empty header name".to_string()));
            }
            return Ok(ColumnRef::Header(name.trim().to_string()));
        }
        column_letter_to_index(s)?;
        Ok(ColumnRef::Letter(s.to_uppercase()))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Letter(letter) => write!(f, "{}", letter),
            ColumnRef::Header(name) => write!(f, "header:{}", name),
        }
    }
}

/// Convert a spreadsheet column letter to a 0-based index
pub fn column_letter_to_index(letter: &str) -> Result<usize> {
    let letter = letter.trim();
    if letter.is_empty() || letter.len() > 3 || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidInput(format!("Invalid column letter: '{}'", letter)));
    }
    let index = letter
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Ok(index - 1)
}

/// Concatenate data rows of several sheets under the first sheet's header
pub fn merge_sheets(name: &str, sheets: Vec<Sheet>) -> Sheet {
    let mut iter = sheets.into_iter();
    let Some(first) = iter.next() else {
        return Sheet::new(name, Vec::new());
    };

    let headers = first.headers().to_vec();
    let mut rows = first.into_rows();
    for sheet in iter {
        rows.extend(sheet.into_rows());
    }
    Sheet::with_rows(name, headers, rows)
}
