//! Enrichment runs: loading master files and enriching working files

use recon_common::{Error, Result};
use std::path::{Path, PathBuf};

use super::{display_name, require_file, Pipeline, RunPermit};
use crate::models::{EnrichFileReport, EnrichSummary, LoadSummary, MergeStrategy};
use crate::services::enrichment_loader::EnrichmentLoader;
use crate::services::enrichment_merger::{enrich_sheet, EnrichOptions};
use crate::services::phone_adjuster::ensure_phone_headers;
use crate::services::Reporter;
use crate::utils::create_backup;

impl Pipeline {
    /// Fill phone columns of each file from the enrichment collection
    pub async fn enrich(
        &self,
        permit: RunPermit,
        files: Vec<PathBuf>,
        strategy: MergeStrategy,
        backup: bool,
    ) -> Result<EnrichSummary> {
        const OP: &str = "enrich";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let mut summary = EnrichSummary::default();
        for path in &files {
            let report = match self.enrich_file(&reporter, path, strategy, backup).await {
                Ok(report) => {
                    reporter.info(format!(
                        "{}: {} processed, {} enriched, {} not found",
                        report.file, report.processed, report.enriched, report.not_found
                    ));
                    report
                }
                Err(e) => {
                    reporter.error(format!("{}: skipped ({})", display_name(path), e));
                    EnrichFileReport {
                        file: display_name(path),
                        error: Some(e.to_string()),
                        ..EnrichFileReport::default()
                    }
                }
            };
            summary.processed += report.processed;
            summary.enriched += report.enriched;
            summary.not_found += report.not_found;
            summary.files.push(report);
        }

        Self::finish(&reporter, OP, Ok(summary), |s| {
            format!(
                "{} file(s): {} processed, {} enriched, {} not found",
                s.files.len(),
                s.processed,
                s.enriched,
                s.not_found
            )
        })
    }

    async fn enrich_file(
        &self,
        reporter: &Reporter,
        path: &Path,
        strategy: MergeStrategy,
        backup: bool,
    ) -> Result<EnrichFileReport> {
        require_file(path)?;
        if backup {
            let copy = create_backup(path, "backup_enrich")?;
            reporter.info(format!("Backup created: {}", copy.display()));
        }

        let mut sheet = self.source.open(path)?;
        let opts = EnrichOptions {
            collection: &self.settings.enrichment_collection,
            strategy,
            phone_prefix: &self.settings.phone_prefix,
            batch_rows: self.settings.enrich_batch_rows,
        };
        let mut report = enrich_sheet(self.store.as_ref(), &mut sheet, &opts, reporter).await?;
        self.source.save(&sheet, path)?;
        report.file = display_name(path);
        Ok(report)
    }

    /// Upsert phones of each master file into the enrichment collection
    pub async fn load_enrichment(&self, permit: RunPermit, files: Vec<PathBuf>) -> Result<LoadSummary> {
        const OP: &str = "enrichment-load";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let loader = EnrichmentLoader::new(self.store.as_ref(), &reporter, &self.settings.enrichment_collection)
            .with_sizes(self.settings.load_flush_rows, self.settings.load_write_chunk);

        let mut summary = LoadSummary::default();
        for path in &files {
            let name = display_name(path);
            let outcome = async {
                require_file(path)?;
                let sheet = self.source.open(path)?;
                loader.load_sheet(&sheet, &name).await
            }
            .await;

            match outcome {
                Ok(outcome) => {
                    summary.files_processed += 1;
                    summary.identifiers_written += outcome.identifiers_written;
                    summary.rows_skipped += outcome.rows_skipped;
                }
                Err(e) => {
                    summary.files_skipped += 1;
                    reporter.error(format!("{}: skipped ({})", name, e));
                }
            }
        }

        Self::finish(&reporter, OP, Ok(summary), |s| {
            format!(
                "{} file(s) loaded, {} skipped, {} identifiers written",
                s.files_processed, s.files_skipped, s.identifiers_written
            )
        })
    }

    /// Append missing `fone1..foneN` headers to each file
    ///
    /// Returns `(file, headers added)` for every file that gained headers.
    pub async fn prepare_phone_headers(&self, permit: RunPermit, files: Vec<PathBuf>) -> Result<Vec<(PathBuf, usize)>> {
        const OP: &str = "prepare-phone-headers";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let mut prepared = Vec::new();
        for path in &files {
            let name = display_name(path);
            let result = (|| {
                require_file(path)?;
                let mut sheet = self.source.open(path)?;
                let added =
                    ensure_phone_headers(&mut sheet, &self.settings.phone_prefix, self.settings.phone_columns);
                if added > 0 {
                    self.source.save(&sheet, path)?;
                }
                Ok::<_, Error>(added)
            })();

            match result {
                Ok(0) => reporter.info(format!("{}: all phone headers already present", name)),
                Ok(added) => {
                    reporter.info(format!("{}: {} phone header(s) added", name, added));
                    prepared.push((path.clone(), added));
                }
                Err(e) => reporter.error(format!("{}: skipped ({})", name, e)),
            }
            tokio::task::yield_now().await;
        }

        Self::finish(&reporter, OP, Ok(prepared), |p| format!("{} file(s) updated", p.len()))
    }
}
