//! Timestamp utilities and batch tags

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Batch tag for a reconciliation commit (`batch-<unix millis>`)
pub fn batch_tag() -> String {
    tag_with_prefix("batch")
}

/// Timestamp-derived tag with an arbitrary prefix (`<prefix>-<unix millis>`)
pub fn tag_with_prefix(prefix: &str) -> String {
    format!("{}-{}", prefix, now().timestamp_millis())
}
