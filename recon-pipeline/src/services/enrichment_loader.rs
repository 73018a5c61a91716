//! Loading master files into the enrichment collection
//!
//! Phones found in a master file are grouped per identifier and upserted with
//! a field-level merge, so other fields of an existing record survive.

use recon_common::identifier::digits_only;
use recon_common::{Error, Identifier, Result};
use std::collections::HashMap;

use crate::models::EnrichmentRecord;
use crate::services::Reporter;
use crate::sheet::Sheet;
use crate::store::{Document, DocumentStore};

/// Identifiers shorter than this (in digits) are ignored
pub const MIN_IDENTIFIER_DIGITS: usize = 8;

const PHONE_HEADER_PREFIXES: [&str; 3] = ["fone", "telefone", "celular"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadFileOutcome {
    pub identifiers_written: usize,
    pub rows_skipped: usize,
}

/// Phones grouped per identifier, in first-seen order
#[derive(Default)]
struct PendingPhones {
    order: Vec<Identifier>,
    phones: HashMap<Identifier, Vec<String>>,
}

impl PendingPhones {
    fn add(&mut self, id: Identifier, phones: Vec<String>) {
        match self.phones.get_mut(&id) {
            Some(existing) => existing.extend(phones),
            None => {
                self.order.push(id.clone());
                self.phones.insert(id, phones);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn take(&mut self) -> Vec<(Identifier, Vec<String>)> {
        let mut phones = std::mem::take(&mut self.phones);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| phones.remove(&id).map(|p| (id, p)))
            .collect()
    }
}

pub struct EnrichmentLoader<'a> {
    store: &'a dyn DocumentStore,
    reporter: &'a Reporter,
    collection: &'a str,
    flush_rows: usize,
    write_chunk: usize,
}

impl<'a> EnrichmentLoader<'a> {
    pub fn new(store: &'a dyn DocumentStore, reporter: &'a Reporter, collection: &'a str) -> Self {
        Self {
            store,
            reporter,
            collection,
            flush_rows: 5000,
            write_chunk: 400,
        }
    }

    pub fn with_sizes(mut self, flush_rows: usize, write_chunk: usize) -> Self {
        self.flush_rows = flush_rows.max(1);
        self.write_chunk = write_chunk.max(1);
        self
    }

    /// Load one master sheet
    ///
    /// Needs a `cpf`/`cnpj` column and at least one phone column
    /// (`fone*`, `telefone*`, `celular*`); otherwise `ColumnNotFound`.
    pub async fn load_sheet(&self, sheet: &Sheet, source_file: &str) -> Result<LoadFileOutcome> {
        let id_col = sheet.header_any(&["cpf", "cnpj"])?;
        let phone_cols: Vec<usize> = sheet
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                let h = h.trim().to_lowercase();
                PHONE_HEADER_PREFIXES.iter().any(|p| h.starts_with(p))
            })
            .map(|(i, _)| i)
            .collect();
        if phone_cols.is_empty() {
            return Err(Error::ColumnNotFound(PHONE_HEADER_PREFIXES.join("/")));
        }

        let mut outcome = LoadFileOutcome::default();
        let mut pending = PendingPhones::default();

        for row in 0..sheet.row_count() {
            let raw_id = sheet.get(row, id_col);
            if digits_only(raw_id).len() < MIN_IDENTIFIER_DIGITS {
                outcome.rows_skipped += 1;
            } else {
                let phones: Vec<String> = phone_cols
                    .iter()
                    .map(|&col| sheet.get(row, col).trim())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                if !phones.is_empty() {
                    pending.add(Identifier::normalize(raw_id), phones);
                }
            }

            if (row + 1) % self.flush_rows == 0 && !pending.is_empty() {
                outcome.identifiers_written += self.flush(&mut pending, source_file).await?;
                tokio::task::yield_now().await;
            }
        }

        if !pending.is_empty() {
            outcome.identifiers_written += self.flush(&mut pending, source_file).await?;
        }

        self.reporter.info(format!(
            "{}: {} identifiers written to '{}', {} rows skipped",
            source_file, outcome.identifiers_written, self.collection, outcome.rows_skipped
        ));
        Ok(outcome)
    }

    async fn flush(&self, pending: &mut PendingPhones, source_file: &str) -> Result<usize> {
        let mut docs: Vec<(String, Document)> = Vec::new();
        for (id, phones) in pending.take() {
            if let Some(record) = EnrichmentRecord::from_candidates(&phones, source_file) {
                docs.push((id.into_string(), record.to_document()?));
            }
        }

        let chunk_size = self.write_chunk.min(self.store.limits().max_batch_writes).max(1);
        for chunk in docs.chunks(chunk_size) {
            self.store.batch_upsert(self.collection, chunk, true).await?;
        }
        self.reporter.batch_progress("enrichment-load", docs.len(), docs.len());
        Ok(docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_load_groups_phones_per_identifier() {
        let store = MemoryStore::new();
        let reporter = Reporter::silent();
        let sheet = Sheet::from_strs(
            "master",
            &["CNPJ", "Telefone1", "celular", "obs"],
            &[
                &["12.345.678/0001-99", "11999998888", "", "x"],
                &["12345678000199", "11999998888", "1133334444", ""],
                &["1234", "11999998888", "", ""],
                &["98765432000100", "123", "", ""],
            ],
        );

        let outcome = EnrichmentLoader::new(&store, &reporter, "enr")
            .load_sheet(&sheet, "master.csv")
            .await
            .unwrap();

        assert_eq!(outcome.rows_skipped, 1);
        // The last identifier has no phone with 8+ digits
        assert_eq!(outcome.identifiers_written, 1);
        let doc = store.get("enr", "12345678000199").unwrap();
        assert_eq!(EnrichmentRecord::phones_of(&doc), vec!["11999998888", "1133334444"]);
        assert_eq!(doc["fonte_dados"], "master.csv");
    }

    #[tokio::test]
    async fn test_flush_every_n_rows() {
        let store = MemoryStore::new();
        let reporter = Reporter::silent();
        let rows: Vec<Vec<String>> = (0..10)
            .map(|i| vec![format!("{:014}", i + 1), "11999998888".to_string()])
            .collect();
        let sheet = Sheet::with_rows("m", vec!["cpf".into(), "fone1".into()], rows);

        let outcome = EnrichmentLoader::new(&store, &reporter, "enr")
            .with_sizes(4, 3)
            .load_sheet(&sheet, "m.csv")
            .await
            .unwrap();

        assert_eq!(outcome.identifiers_written, 10);
        // Flushes of 4, 4, 2 rows with write chunks of 3: 2 + 2 + 1 calls
        assert_eq!(store.upsert_calls(), 5);
    }

    #[tokio::test]
    async fn test_merge_keeps_other_fields() {
        let store = MemoryStore::new();
        let reporter = Reporter::silent();
        let extra: Document = serde_json::json!({"razao_social": "ACME"}).as_object().cloned().unwrap();
        store
            .batch_upsert("enr", &[("00012345678901".to_string(), extra)], false)
            .await
            .unwrap();

        let sheet = Sheet::from_strs("m", &["cpf", "fone"], &[&["123.456.789-01", "11988887777"]]);
        EnrichmentLoader::new(&store, &reporter, "enr")
            .load_sheet(&sheet, "m.csv")
            .await
            .unwrap();

        let doc = store.get("enr", "00012345678901").unwrap();
        assert_eq!(doc["razao_social"], "ACME");
        assert_eq!(EnrichmentRecord::phones_of(&doc), vec!["11988887777"]);
    }

    #[tokio::test]
    async fn test_missing_phone_columns() {
        let store = MemoryStore::new();
        let reporter = Reporter::silent();
        let sheet = Sheet::from_strs("m", &["cpf", "nome"], &[&["12345678901", "x"]]);
        let result = EnrichmentLoader::new(&store, &reporter, "enr").load_sheet(&sheet, "m.csv").await;
        assert!(matches!(result, Err(Error::ColumnNotFound(_))));
    }
}
