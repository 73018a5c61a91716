//! Data models for recon-pipeline
//!
//! Reference sets, consultation batches, enrichment records and the
//! per-operation reports returned to callers.

pub mod consultation;
pub mod enrichment;
pub mod reference;
pub mod reports;

pub use consultation::{BatchOutcome, BatchState, ConsultationBatch, CredentialMode, CredentialSlot, Outcome};
pub use enrichment::{filter_phones, EnrichmentRecord, MergeStrategy, STATUS_ENRICHED, STATUS_POOR};
pub use reference::{HistorySet, ReferenceSet};
pub use reports::{
    BlocklistSummary, CleanCounters, CleanFileReport, CleanSummary, CommitReport, ConsultationReport, DeleteOutcome,
    EnrichFileReport, EnrichSummary, FeedSummary, LoadSummary, PipelineStats,
    PurgeSummary,
};
