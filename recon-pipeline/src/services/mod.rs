//! Pipeline services
//!
//! Each service works on sheets and the document store passed in by the
//! workflow layer; none of them owns long-lived state.

pub mod blocklist;
pub mod consultation;
pub mod enrichment_loader;
pub mod enrichment_merger;
pub mod exporter;
pub mod phone_adjuster;
pub mod reconciler;
pub mod reference_loader;
pub mod remote_syncer;
pub mod reporter;

pub use reporter::Reporter;
