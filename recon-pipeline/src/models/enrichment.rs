//! Enrichment records and merge strategies

use chrono::{DateTime, Utc};
use recon_common::identifier::digits_only;
use recon_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::store::Document;

/// Status written to rows that received at least one phone
pub const STATUS_ENRICHED: &str = "Enriquecido";
/// Status written to rows left without new phones
pub const STATUS_POOR: &str = "Pobre";

/// Minimum digits for a stored phone
pub const MIN_PHONE_DIGITS: usize = 8;

/// How fetched phones combine with a row's existing phone cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Clear every phone cell, then fill left to right
    Overwrite,
    /// Fill empty cells only, when at least one is free
    Append,
    /// Touch the row only when no phone is filled
    Ignore,
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(MergeStrategy::Overwrite),
            "append" => Ok(MergeStrategy::Append),
            "ignore" => Ok(MergeStrategy::Ignore),
            other => Err(Error::InvalidInput(format!("Unknown merge strategy: '{}'", other))),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStrategy::Overwrite => "overwrite",
            MergeStrategy::Append => "append",
            MergeStrategy::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

/// Contact data stored under an identifier in the enrichment collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub telefones: Vec<String>,
    pub ultima_atualizacao: DateTime<Utc>,
    pub fonte_dados: String,
}

impl EnrichmentRecord {
    /// Build a record from raw phone candidates; `None` when none survive filtering
    pub fn from_candidates<'a>(
        phones: impl IntoIterator<Item = &'a String>,
        source_file: &str,
    ) -> Option<Self> {
        let telefones = filter_phones(phones);
        if telefones.is_empty() {
            return None;
        }
        Some(Self {
            telefones,
            ultima_atualizacao: recon_common::time::now(),
            fonte_dados: source_file.to_string(),
        })
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Internal("Enrichment record is not an object".to_string())),
            Err(e) => Err(Error::Internal(format!("Serialize enrichment record: {}", e))),
        }
    }

    /// Phones stored in a fetched document (missing field = none)
    pub fn phones_of(doc: &Document) -> Vec<String> {
        doc.get("telefones")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Deduplicate (first occurrence wins) and keep phones with at least 8 digits
pub fn filter_phones<'a>(phones: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for phone in phones {
        if seen.insert(phone.as_str()) && digits_only(phone).len() >= MIN_PHONE_DIGITS {
            kept.push(phone.clone());
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_phones_dedups_and_drops_short() {
        let raw: Vec<String> = ["(11) 9999-8888", "1234567", "(11) 9999-8888", "5511777766665"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(filter_phones(&raw), vec!["(11) 9999-8888", "5511777766665"]);
    }

    #[test]
    fn test_record_requires_a_valid_phone() {
        let raw = vec!["123".to_string()];
        assert!(EnrichmentRecord::from_candidates(&raw, "a.csv").is_none());
    }

    #[test]
    fn test_record_document_shape() {
        let raw = vec!["11999998888".to_string()];
        let record = EnrichmentRecord::from_candidates(&raw, "base.csv").unwrap();
        let doc = record.to_document().unwrap();
        assert_eq!(doc["fonte_dados"], "base.csv");
        assert_eq!(EnrichmentRecord::phones_of(&doc), vec!["11999998888"]);
        assert!(doc["ultima_atualizacao"].is_string());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Append".parse::<MergeStrategy>().unwrap(), MergeStrategy::Append);
        assert!("merge".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::Overwrite.to_string(), "overwrite");
    }
}
