//! Batch state machine for verification runs
//!
//! Only rows whose result cell is empty are submitted, so a rerun over the
//! same file picks up exactly what an earlier run left unresolved. The sheet
//! is saved after every applied batch.

use recon_common::{Error, Identifier, Result};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CredentialSet, VerificationApi, VerificationResponse};
use crate::models::{BatchOutcome, BatchState, ConsultationBatch, ConsultationReport, CredentialMode, Outcome};
use crate::services::reporter::percent;
use crate::services::Reporter;
use crate::sheet::{ColumnRef, Sheet, TabularSource};
use crate::utils::Sleeper;

#[derive(Debug, Clone)]
pub struct ConsultationSettings {
    pub identifier_header: String,
    pub result_column: ColumnRef,
    pub batch_size: usize,
    /// Attempts per batch before it is abandoned
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub inter_batch_delay: Duration,
}

impl Default for ConsultationSettings {
    fn default() -> Self {
        Self {
            identifier_header: "cpf".to_string(),
            result_column: ColumnRef::Letter("C".to_string()),
            batch_size: 20_000,
            max_retries: 3,
            retry_backoff: Duration::from_secs(6 * 60),
            inter_batch_delay: Duration::from_secs(3 * 60),
        }
    }
}

pub struct ConsultationRunner<'a> {
    api: &'a dyn VerificationApi,
    source: &'a dyn TabularSource,
    sleeper: &'a dyn Sleeper,
    credentials: &'a CredentialSet,
    settings: &'a ConsultationSettings,
    reporter: &'a Reporter,
}

impl<'a> ConsultationRunner<'a> {
    pub fn new(
        api: &'a dyn VerificationApi,
        source: &'a dyn TabularSource,
        sleeper: &'a dyn Sleeper,
        credentials: &'a CredentialSet,
        settings: &'a ConsultationSettings,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            api,
            source,
            sleeper,
            credentials,
            settings,
            reporter,
        }
    }

    /// Process files one after another in submission order
    ///
    /// Duplicate paths run once. A failing file is recorded in its report and
    /// the queue moves on.
    pub async fn run_queue(&self, files: &[PathBuf], mode: CredentialMode) -> Vec<ConsultationReport> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&PathBuf> = files.iter().filter(|p| seen.insert(p.as_path())).collect();
        let total = queue.len();
        let mut reports = Vec::with_capacity(total);

        while let Some(path) = queue.pop_front() {
            self.reporter.info(format!(
                "Consultation queue: {} ({} of {})",
                path.display(),
                reports.len() + 1,
                total
            ));
            let report = match self.run_file(path, mode).await {
                Ok(report) => report,
                Err(e) => {
                    self.reporter.error(format!("{}: {}", path.display(), e));
                    ConsultationReport {
                        file: path.display().to_string(),
                        error: Some(e.to_string()),
                        ..ConsultationReport::default()
                    }
                }
            };
            reports.push(report);
        }

        reports
    }

    /// Verify every unresolved row of one file
    pub async fn run_file(&self, path: &Path, mode: CredentialMode) -> Result<ConsultationReport> {
        let mut sheet = self.source.open(path)?;
        let id_col = sheet.header(&self.settings.identifier_header)?;
        let result_col = self.settings.result_column.resolve(&sheet)?;

        let mut report = ConsultationReport {
            file: path.display().to_string(),
            ..ConsultationReport::default()
        };

        let mut pending: Vec<(usize, Identifier)> = Vec::new();
        for row in 0..sheet.row_count() {
            if !sheet.get(row, result_col).trim().is_empty() {
                report.already_resolved += 1;
            } else {
                pending.push((row, Identifier::normalize(sheet.get(row, id_col))));
            }
        }

        if pending.is_empty() {
            self.reporter.info(format!(
                "{}: nothing to verify ({} already resolved)",
                report.file, report.already_resolved
            ));
            return Ok(report);
        }

        let batch_size = self.settings.batch_size.max(1);
        let mut batches: Vec<ConsultationBatch> = pending
            .chunks(batch_size)
            .enumerate()
            .map(|(index, rows)| ConsultationBatch::new(index, rows.to_vec()))
            .collect();
        report.batches = batches.len();

        // Fail before any request if a batch would have no credentials
        for batch in &batches {
            let slot = mode.slot_for_batch(batch.index);
            if self.credentials.get(slot).is_none() {
                return Err(Error::Config(format!("No {} credentials configured", slot)));
            }
        }

        self.reporter.info(format!(
            "{}: {} rows to verify in {} batch(es), {} already resolved",
            report.file,
            pending.len(),
            batches.len(),
            report.already_resolved
        ));

        let total_batches = batches.len();
        for batch in batches.iter_mut() {
            self.run_batch(&mut sheet, path, result_col, batch, mode).await;

            match &batch.outcome {
                BatchOutcome::Resolved { available, client } => {
                    report.resolved_batches += 1;
                    report.available += available;
                    report.client += client;
                }
                BatchOutcome::Abandoned { .. } => report.abandoned_batches += 1,
                BatchOutcome::Pending => {}
            }
            self.reporter.batch_progress("consult", batch.index + 1, total_batches);
            self.reporter.file_progress(&report.file, percent(batch.index + 1, total_batches));

            let resolved = matches!(batch.outcome, BatchOutcome::Resolved { .. });
            if resolved && batch.index + 1 < total_batches {
                batch.transition(BatchState::Sleeping);
                self.reporter.info(format!(
                    "Waiting {}s before the next batch",
                    self.settings.inter_batch_delay.as_secs()
                ));
                self.sleeper.sleep(self.settings.inter_batch_delay).await;
                batch.transition(BatchState::Idle);
            }
        }

        self.reporter.info(format!(
            "{}: {} available, {} client, {} batch(es) abandoned",
            report.file, report.available, report.client, report.abandoned_batches
        ));
        Ok(report)
    }

    async fn run_batch(
        &self,
        sheet: &mut Sheet,
        path: &Path,
        result_col: usize,
        batch: &mut ConsultationBatch,
        mode: CredentialMode,
    ) {
        let max_attempts = self.settings.max_retries.max(1);

        loop {
            match self.attempt(sheet, path, result_col, batch, mode).await {
                Ok((available, client)) => {
                    batch.outcome = BatchOutcome::Resolved { available, client };
                    batch.transition(BatchState::Idle);
                    return;
                }
                Err(e) => {
                    batch.transition(BatchState::Failed);
                    batch.retries += 1;
                    // Labels written before a failed save must not leak into a later save
                    for (row, _) in &batch.rows {
                        sheet.set(*row, result_col, "");
                    }

                    if batch.retries >= max_attempts {
                        self.reporter.error(format!(
                            "Batch {} abandoned after {} attempt(s): {}",
                            batch.index + 1,
                            batch.retries,
                            e
                        ));
                        batch.outcome = BatchOutcome::Abandoned {
                            last_error: e.to_string(),
                        };
                        batch.transition(BatchState::Idle);
                        return;
                    }

                    self.reporter.warn(format!(
                        "Batch {} failed (attempt {} of {}): {}; retrying in {}s",
                        batch.index + 1,
                        batch.retries,
                        max_attempts,
                        e,
                        self.settings.retry_backoff.as_secs()
                    ));
                    self.sleeper.sleep(self.settings.retry_backoff).await;
                    batch.transition(BatchState::Idle);
                }
            }
        }
    }

    async fn attempt(
        &self,
        sheet: &mut Sheet,
        path: &Path,
        result_col: usize,
        batch: &mut ConsultationBatch,
        mode: CredentialMode,
    ) -> Result<(usize, usize)> {
        let slot = mode.slot_for_batch(batch.index);
        let credentials = self
            .credentials
            .get(slot)
            .ok_or_else(|| Error::Config(format!("No {} credentials configured", slot)))?;

        batch.transition(BatchState::TokenRequested);
        self.reporter.info(format!(
            "Batch {}: {} identifiers with {} credentials",
            batch.index + 1,
            batch.len(),
            credentials.label
        ));
        let token = self.api.acquire_token(credentials).await?;

        batch.transition(BatchState::Querying);
        let body = self.api.verify(&token, &batch.identifiers()).await?;
        let response = VerificationResponse::parse(&body)?;

        batch.transition(BatchState::Applying);
        let (mut available, mut client) = (0, 0);
        for (row, id) in &batch.rows {
            let outcome = response.outcome_for(id);
            match outcome {
                Outcome::Available => available += 1,
                Outcome::Client => client += 1,
            }
            sheet.set(*row, result_col, outcome.label());
        }
        self.source.save(sheet, path)?;

        Ok((available, client))
    }
}
