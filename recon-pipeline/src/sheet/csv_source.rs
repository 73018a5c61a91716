//! CSV-backed tabular source
//!
//! Saves never leave a half-written file in place: rows go to a temporary
//! file in the target directory which is then renamed over the original.

use super::Sheet;
use recon_common::{Error, Result};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Row-oriented file collaborator
pub trait TabularSource: Send + Sync {
    /// Read a sheet; the first record is the header row
    fn open(&self, path: &Path) -> Result<Sheet>;

    /// Replace the file at `path` with `sheet` (atomic)
    fn save(&self, sheet: &Sheet, path: &Path) -> Result<()>;
}

/// Comma-separated files read and written with the `csv` crate
#[derive(Debug, Clone)]
pub struct CsvSource {
    delimiter: u8,
}

impl CsvSource {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Use a different field delimiter (e.g. `;` for locale-exported files)
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl Default for CsvSource {
    fn default() -> Self {
        Self::new()
    }
}

fn file_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::FileIo(format!("{}: {}", path.display(), err))
}

impl TabularSource for CsvSource {
    fn open(&self, path: &Path) -> Result<Sheet> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| file_error(path, e))?;

        let mut headers: Vec<String> = reader
            .headers()
            .map_err(|e| file_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if let Some(first) = headers.first_mut() {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| file_error(path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(path = %path.display(), rows = rows.len(), "Opened sheet");
        Ok(Sheet::with_rows(name, headers, rows))
    }

    fn save(&self, sheet: &Sheet, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| file_error(path, e))?;
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(self.delimiter)
                .flexible(true)
                .from_writer(temp.as_file_mut());

            writer
                .write_record(sheet.headers())
                .map_err(|e| file_error(path, e))?;
            for row in sheet.rows() {
                writer.write_record(row).map_err(|e| file_error(path, e))?;
            }
            writer.flush().map_err(|e| file_error(path, e))?;
        }
        temp.as_file_mut()
            .flush()
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| file_error(path, e))?;

        // Rename over the original only after the full write succeeded
        temp.persist(path).map_err(|e| file_error(path, e.error))?;

        debug!(path = %path.display(), rows = sheet.row_count(), "Saved sheet");
        Ok(())
    }
}
