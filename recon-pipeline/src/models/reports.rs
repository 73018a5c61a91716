//! Per-operation reports
//!
//! Every run returns one of these and also summarises it as a log event.

use serde::Serialize;
use std::path::PathBuf;

/// Counters of one clean pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanCounters {
    pub duplicate: usize,
    pub removed_by_root: usize,
    pub cleaned_phone: usize,
    pub total_retained: usize,
}

impl CleanCounters {
    pub fn absorb(&mut self, other: &CleanCounters) {
        self.duplicate += other.duplicate;
        self.removed_by_root += other.removed_by_root;
        self.cleaned_phone += other.cleaned_phone;
        self.total_retained += other.total_retained;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanFileReport {
    pub file: String,
    pub counters: CleanCounters,
    pub newly_seen: usize,
    pub output: Option<PathBuf>,
    /// Set when the file was skipped
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanSummary {
    pub files: Vec<CleanFileReport>,
    pub totals: CleanCounters,
    pub commit: Option<CommitReport>,
    pub commit_error: Option<String>,
}

/// Result of committing newly seen identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub batch_id: String,
    pub committed: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    NotFound,
    Deleted { count: usize },
}

impl DeleteOutcome {
    pub fn count(&self) -> usize {
        match self {
            DeleteOutcome::NotFound => 0,
            DeleteOutcome::Deleted { count } => *count,
        }
    }
}

/// Result of growing the root collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    pub checked: usize,
    pub already_present: usize,
    pub written: usize,
    pub failed_chunks: usize,
}

impl FeedSummary {
    pub fn absorb(&mut self, other: &FeedSummary) {
        self.checked += other.checked;
        self.already_present += other.already_present;
        self.written += other.written;
        self.failed_chunks += other.failed_chunks;
    }
}

/// Result of merging a blocklist into the root file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlocklistSummary {
    pub root: PathBuf,
    pub backup: Option<PathBuf>,
    pub blocklist_values: usize,
    pub added: usize,
    pub total: usize,
}

/// Result of emptying the history collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub deleted: usize,
    pub chunks: usize,
    pub mirror_cleared: usize,
}

/// Result of loading master files into the enrichment collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub identifiers_written: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichFileReport {
    pub file: String,
    pub processed: usize,
    pub enriched: usize,
    pub not_found: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichSummary {
    pub files: Vec<EnrichFileReport>,
    pub processed: usize,
    pub enriched: usize,
    pub not_found: usize,
}

/// Result of one file's consultation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsultationReport {
    pub file: String,
    /// Rows that already had a result and were not submitted
    pub already_resolved: usize,
    pub batches: usize,
    pub resolved_batches: usize,
    pub abandoned_batches: usize,
    pub available: usize,
    pub client: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub history_mirror: usize,
    pub history_collection: u64,
    pub enrichment_collection: u64,
    pub root_collection: u64,
    pub run_active: bool,
}
