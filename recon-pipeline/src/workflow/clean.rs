//! Clean passes: root/history filtering and commit of newly seen identifiers

use recon_common::time::batch_tag;
use recon_common::{Error, Identifier, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{display_name, require_file, Pipeline, RunPermit};
use crate::models::{CleanFileReport, CleanSummary, HistorySet, ReferenceSet};
use crate::services::phone_adjuster::compact_phones;
use crate::services::reconciler::{self, CleanOptions, CleanOutcome};
use crate::services::reference_loader;
use crate::services::remote_syncer::RemoteSyncer;
use crate::services::Reporter;
use crate::sheet::ColumnRef;
use crate::utils::create_backup;

/// Where the root set comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootSource {
    /// Every key of the root collection
    Remote,
    /// One column of a root file
    File {
        path: PathBuf,
        #[serde(default)]
        column: Option<String>,
    },
    /// No root filtering
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanRequest {
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub root: RootSource,
    /// Destination column matched against the root set (`B` or `header:<name>`)
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub check_history: bool,
    #[serde(default)]
    pub persist: bool,
    /// Compact phone columns after cleaning
    #[serde(default)]
    pub auto_adjust: bool,
}

/// Identifiers new to history across all files of a run, first-seen order
#[derive(Default)]
struct RunNewlySeen {
    seen: HashSet<Identifier>,
    ordered: Vec<Identifier>,
}

impl RunNewlySeen {
    fn extend(&mut self, ids: Vec<Identifier>) {
        for id in ids {
            if self.seen.insert(id.clone()) {
                self.ordered.push(id);
            }
        }
    }
}

impl Pipeline {
    /// Clean each file in place against the root set and the history mirror
    ///
    /// With `persist`, identifiers new to history are committed under one
    /// fresh batch id after the last file.
    pub async fn clean(&self, permit: RunPermit, request: CleanRequest) -> Result<CleanSummary> {
        const OP: &str = "clean";
        let reporter = self.reporter(&permit);
        reporter.started(OP);
        let result = self.run_clean(&reporter, request).await;
        Self::finish(&reporter, OP, result, |s| {
            format!(
                "{} file(s): {} duplicate, {} removed by root, {} phones cleaned, {} retained",
                s.files.len(),
                s.totals.duplicate,
                s.totals.removed_by_root,
                s.totals.cleaned_phone,
                s.totals.total_retained
            )
        })
    }

    async fn run_clean(&self, reporter: &Reporter, request: CleanRequest) -> Result<CleanSummary> {
        let destination = match &request.destination {
            Some(column) => column.parse()?,
            None => self.settings.destination_column.clone(),
        };
        let root = self.load_root_set(reporter, &request.root).await?;
        let batch_id = batch_tag();
        if request.persist {
            reporter.info(format!("New identifiers will be saved as batch {}", batch_id));
        }

        let opts = CleanOptions {
            root: &root,
            destination: &destination,
            identifier_header: &self.settings.identifier_header,
            phone_prefix: &self.settings.phone_prefix,
            check_history: request.check_history,
            persist: request.persist,
        };

        let mut summary = CleanSummary::default();
        let mut new_ids = RunNewlySeen::default();
        {
            let history = self.history.read().await;
            reporter.info(format!("History mirror holds {} identifiers", history.len()));

            for path in &request.files {
                let mut report = CleanFileReport {
                    file: display_name(path),
                    ..CleanFileReport::default()
                };
                match self
                    .clean_file(reporter, path, &history, &opts, request.backup, request.auto_adjust)
                    .await
                {
                    Ok(outcome) => {
                        report.counters = outcome.counters;
                        report.newly_seen = outcome.newly_seen.len();
                        report.output = Some(path.clone());
                        summary.totals.absorb(&outcome.counters);
                        new_ids.extend(outcome.newly_seen);
                        reporter.info(format!(
                            "{}: {} duplicate, {} removed by root, {} phones cleaned, {} retained",
                            report.file,
                            report.counters.duplicate,
                            report.counters.removed_by_root,
                            report.counters.cleaned_phone,
                            report.counters.total_retained
                        ));
                    }
                    Err(e) => {
                        reporter.error(format!("{}: skipped ({})", report.file, e));
                        report.error = Some(e.to_string());
                    }
                }
                summary.files.push(report);
            }
        }

        if request.persist {
            self.commit_run(reporter, &mut summary, new_ids.ordered, &batch_id).await;
        }
        Ok(summary)
    }

    async fn load_root_set(&self, reporter: &Reporter, source: &RootSource) -> Result<ReferenceSet> {
        let root = match source {
            RootSource::Remote => {
                reporter.info(format!("Loading root set from '{}'", self.settings.root_collection));
                reference_loader::load_from_remote(
                    self.store.as_ref(),
                    &self.settings.root_collection,
                    self.settings.scan_page,
                )
                .await?
            }
            RootSource::File { path, column } => {
                if !path.is_file() {
                    return Err(Error::NotFound(format!("Root file not found: {}", path.display())));
                }
                let column: ColumnRef = match column {
                    Some(c) => c.parse()?,
                    None => self.settings.root_column.clone(),
                };
                let sheet = self.source.open(path)?;
                reference_loader::load_from_column_ref(&sheet, &column)?
            }
            RootSource::None => ReferenceSet::new(),
        };
        reporter.info(format!("Root set loaded with {} values", root.len()));
        Ok(root)
    }

    async fn clean_file(
        &self,
        reporter: &Reporter,
        path: &Path,
        history: &HistorySet,
        opts: &CleanOptions<'_>,
        backup: bool,
        auto_adjust: bool,
    ) -> Result<CleanOutcome> {
        require_file(path)?;
        if backup {
            let copy = create_backup(path, "backup")?;
            reporter.info(format!("Backup created: {}", copy.display()));
        }

        let sheet = self.source.open(path)?;
        let name = display_name(path);
        let mut outcome =
            reconciler::reconcile(sheet, history, opts, |pct| reporter.file_progress(&name, pct)).await?;

        if auto_adjust && compact_phones(&mut outcome.sheet, &self.settings.phone_prefix).is_none() {
            reporter.warn(format!("{}: no phone columns to adjust", name));
        }
        self.source.save(&outcome.sheet, path)?;
        Ok(outcome)
    }

    async fn commit_run(&self, reporter: &Reporter, summary: &mut CleanSummary, ids: Vec<Identifier>, batch_id: &str) {
        if ids.is_empty() {
            reporter.info("No new identifiers to save");
            return;
        }

        reporter.info(format!("Saving {} new identifiers", ids.len()));
        let mut history = self.history.write().await;
        let result = RemoteSyncer::new(self.store.as_ref(), reporter)
            .with_chunks(self.settings.write_chunk, self.settings.delete_chunk)
            .commit_new(&self.settings.history_collection, &mut history, &ids, batch_id)
            .await;

        match result {
            Ok(commit) => {
                reporter.info(format!("Batch id saved: {} (use it to delete this batch)", commit.batch_id));
                summary.commit = Some(commit);
            }
            Err(e) => {
                reporter.error(e.to_string());
                summary.commit_error = Some(e.to_string());
            }
        }
    }

    /// History-only pass over each file, saved in place
    pub async fn clean_by_history(&self, permit: RunPermit, files: Vec<PathBuf>, persist: bool) -> Result<CleanSummary> {
        const OP: &str = "clean-history";
        let reporter = self.reporter(&permit);
        reporter.started(OP);
        let result = self.run_clean_by_history(&reporter, &files, persist).await;
        Self::finish(&reporter, OP, result, |s| {
            format!(
                "{} file(s): {} removed, {} retained",
                s.files.len(),
                s.totals.duplicate,
                s.totals.total_retained
            )
        })
    }

    async fn run_clean_by_history(&self, reporter: &Reporter, files: &[PathBuf], persist: bool) -> Result<CleanSummary> {
        let batch_id = batch_tag();
        let mut summary = CleanSummary::default();
        let mut new_ids = RunNewlySeen::default();

        {
            let history = self.history.read().await;
            reporter.info(format!(
                "History-only clean of {} file(s) against {} identifiers",
                files.len(),
                history.len()
            ));

            for path in files {
                let mut report = CleanFileReport {
                    file: display_name(path),
                    ..CleanFileReport::default()
                };
                let outcome = async {
                    require_file(path)?;
                    let sheet = self.source.open(path)?;
                    let outcome =
                        reconciler::clean_by_history(sheet, &history, &self.settings.identifier_header, persist)
                            .await?;
                    self.source.save(&outcome.sheet, path)?;
                    Ok::<_, Error>(outcome)
                }
                .await;

                match outcome {
                    Ok(outcome) => {
                        report.counters = outcome.counters;
                        report.newly_seen = outcome.newly_seen.len();
                        report.output = Some(path.clone());
                        summary.totals.absorb(&outcome.counters);
                        new_ids.extend(outcome.newly_seen);
                        reporter.info(format!(
                            "{}: {} removed, {} retained",
                            report.file, report.counters.duplicate, report.counters.total_retained
                        ));
                    }
                    Err(e) => {
                        reporter.error(format!("{}: skipped ({})", report.file, e));
                        report.error = Some(e.to_string());
                    }
                }
                summary.files.push(report);
            }
        }

        if persist {
            self.commit_run(reporter, &mut summary, new_ids.ordered, &batch_id).await;
        }
        Ok(summary)
    }
}
