//! Root feeding, batch deletion, phone adjustment, merging and exports

use recon_common::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{display_name, require_file, Pipeline, RunPermit};
use crate::models::{BlocklistSummary, DeleteOutcome, FeedSummary, PurgeSummary};
use crate::services::blocklist::{flatten_values, merge_blocklist};
use crate::services::exporter;
use crate::services::phone_adjuster::compact_phones;
use crate::services::remote_syncer::RemoteSyncer;
use crate::services::Reporter;
use crate::sheet::merge_sheets;
use crate::utils::create_backup;

impl Pipeline {
    fn syncer<'a>(&'a self, reporter: &'a Reporter) -> RemoteSyncer<'a> {
        RemoteSyncer::new(self.store.as_ref(), reporter)
            .with_chunks(self.settings.write_chunk, self.settings.delete_chunk)
    }

    /// Add the identifiers of each file to the root collection
    pub async fn feed_root(&self, permit: RunPermit, files: Vec<PathBuf>) -> Result<FeedSummary> {
        const OP: &str = "feed-root";
        let reporter = self.reporter(&permit);
        reporter.started(OP);
        let syncer = self.syncer(&reporter);

        let mut summary = FeedSummary::default();
        for path in &files {
            let name = display_name(path);
            let result = async {
                require_file(path)?;
                let sheet = self.source.open(path)?;
                syncer
                    .feed_from_sheet(
                        &self.settings.root_collection,
                        &sheet,
                        &name,
                        self.settings.root_feed_read_batch,
                    )
                    .await
            }
            .await;

            match result {
                Ok(file_summary) => {
                    reporter.info(format!(
                        "{}: {} checked, {} already present, {} written",
                        name, file_summary.checked, file_summary.already_present, file_summary.written
                    ));
                    summary.absorb(&file_summary);
                }
                Err(e) => reporter.error(format!("{}: skipped ({})", name, e)),
            }
        }

        Self::finish(&reporter, OP, Ok(summary), |s| {
            format!(
                "{} checked, {} already present, {} written, {} failed chunk(s)",
                s.checked, s.already_present, s.written, s.failed_chunks
            )
        })
    }

    /// Delete every history document tagged with `batch_id`
    ///
    /// Runs outside the run lock; the history write lock keeps it from
    /// interleaving with a clean pass.
    pub async fn delete_batch(&self, batch_id: &str) -> Result<DeleteOutcome> {
        const OP: &str = "delete-batch";
        let batch_id = batch_id.trim();
        if batch_id.is_empty() {
            return Err(Error::InvalidInput("Batch id is empty".to_string()));
        }

        let reporter = Reporter::new(self.event_bus.clone(), Uuid::new_v4());
        reporter.started(OP);
        let mut history = self.history.write().await;
        let result = self
            .syncer(&reporter)
            .delete_batch(&self.settings.history_collection, &mut history, batch_id)
            .await;
        drop(history);

        Self::finish(&reporter, OP, result, |outcome| match outcome {
            DeleteOutcome::NotFound => format!("No documents tagged '{}'", batch_id),
            DeleteOutcome::Deleted { count } => format!("{} documents of '{}' deleted", count, batch_id),
        })
    }

    /// Delete the whole history collection and empty the mirror
    ///
    /// Holds the history write lock for the whole purge.
    pub async fn purge_history(&self, permit: RunPermit) -> Result<PurgeSummary> {
        const OP: &str = "purge-history";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let mut history = self.history.write().await;
        let result = self
            .syncer(&reporter)
            .purge_collection(&self.settings.history_collection, &mut history)
            .await;
        drop(history);

        Self::finish(&reporter, OP, result, |s| {
            format!(
                "{} documents deleted from '{}' in {} chunk(s)",
                s.deleted, self.settings.history_collection, s.chunks
            )
        })
    }

    /// Merge the values of `blocklist` into the root file, saved in place
    pub async fn update_blocklist(
        &self,
        permit: RunPermit,
        blocklist: PathBuf,
        root: PathBuf,
        backup: bool,
    ) -> Result<BlocklistSummary> {
        const OP: &str = "update-blocklist";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let result = (|| {
            require_file(&blocklist)?;
            require_file(&root)?;
            let backup = if backup {
                let copy = create_backup(&root, "backup")?;
                reporter.info(format!("Root backup created: {}", copy.display()));
                Some(copy)
            } else {
                None
            };

            let block_sheet = self.source.open(&blocklist)?;
            let root_sheet = self.source.open(&root)?;
            let (merged, added) = merge_blocklist(&root_sheet, &block_sheet);
            self.source.save(&merged, &root)?;

            Ok::<_, Error>(BlocklistSummary {
                root: root.clone(),
                backup,
                blocklist_values: flatten_values(&block_sheet).len(),
                added,
                total: merged.headers().len() + merged.row_count(),
            })
        })();

        Self::finish(&reporter, OP, result, |s| {
            format!(
                "{}: {} blocklist values added, {} values in total",
                display_name(&s.root),
                s.added,
                s.total
            )
        })
    }

    /// Shift phones left in one file, saved in place
    pub async fn adjust_phones(&self, permit: RunPermit, file: PathBuf, backup: bool) -> Result<usize> {
        const OP: &str = "adjust-phones";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let result = (|| {
            require_file(&file)?;
            if backup {
                let copy = create_backup(&file, "backup_fones")?;
                reporter.info(format!("Backup created: {}", copy.display()));
            }
            let mut sheet = self.source.open(&file)?;
            let rows = compact_phones(&mut sheet, &self.settings.phone_prefix)
                .ok_or_else(|| Error::ColumnNotFound(format!("{}*", self.settings.phone_prefix)))?;
            self.source.save(&sheet, &file)?;
            Ok::<_, Error>(rows)
        })();

        Self::finish(&reporter, OP, result, |rows| {
            format!("{}: phones adjusted on {} rows", display_name(&file), rows)
        })
    }

    /// Concatenate data rows of `files` under the first file's header
    pub async fn merge_files(&self, permit: RunPermit, files: Vec<PathBuf>, dest: PathBuf) -> Result<usize> {
        const OP: &str = "merge";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let result = async {
            if files.len() < 2 {
                return Err(Error::InvalidInput("Select at least two files to merge".to_string()));
            }
            let mut sheets = Vec::with_capacity(files.len());
            for path in &files {
                require_file(path)?;
                let sheet = self.source.open(path)?;
                if sheet.is_empty() {
                    reporter.warn(format!("{}: no data rows besides the header", display_name(path)));
                } else {
                    reporter.info(format!("{}: {} rows", display_name(path), sheet.row_count()));
                }
                sheets.push(sheet);
                tokio::task::yield_now().await;
            }

            let merged = merge_sheets("merged", sheets);
            self.source.save(&merged, &dest)?;
            Ok(merged.row_count())
        }
        .await;

        Self::finish(&reporter, OP, result, |rows| {
            format!("{} rows merged into {}", rows, dest.display())
        })
    }

    /// Write the history mirror to `dest`; returns the row count
    pub async fn export_history(&self, dest: &Path) -> Result<usize> {
        let sheet = exporter::history_sheet(&*self.history.read().await);
        self.source.save(&sheet, dest)?;
        tracing::info!(dest = %dest.display(), rows = sheet.row_count(), "History exported");
        Ok(sheet.row_count())
    }

    /// Write the enrichment collection to `dest`; returns the row count
    pub async fn export_enrichment(&self, dest: &Path) -> Result<usize> {
        let sheet = exporter::enrichment_sheet(
            self.store.as_ref(),
            &self.settings.enrichment_collection,
            self.settings.scan_page,
        )
        .await?;
        self.source.save(&sheet, dest)?;
        tracing::info!(dest = %dest.display(), rows = sheet.row_count(), "Enrichment collection exported");
        Ok(sheet.row_count())
    }
}
