//! Consultation batch model
//!
//! A batch walks `Idle → TokenRequested → Querying → Applying → Sleeping →
//! Idle`; any error sends it to `Failed`, from which it either retries
//! (back to `Idle`) or is abandoned once the retry cap is hit.

use recon_common::{Error, Identifier, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which credential pair a batch uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    Primary,
    Secondary,
    /// Even batch index → primary, odd → secondary
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSlot {
    Primary,
    Secondary,
}

impl CredentialMode {
    pub fn slot_for_batch(&self, batch_index: usize) -> CredentialSlot {
        match self {
            CredentialMode::Primary => CredentialSlot::Primary,
            CredentialMode::Secondary => CredentialSlot::Secondary,
            CredentialMode::Alternate if batch_index % 2 == 0 => CredentialSlot::Primary,
            CredentialMode::Alternate => CredentialSlot::Secondary,
        }
    }
}

impl FromStr for CredentialMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(CredentialMode::Primary),
            "secondary" => Ok(CredentialMode::Secondary),
            "alternate" => Ok(CredentialMode::Alternate),
            other => Err(Error::InvalidInput(format!("Unknown credential mode: '{}'", other))),
        }
    }
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSlot::Primary => f.write_str("primary"),
            CredentialSlot::Secondary => f.write_str("secondary"),
        }
    }
}

/// Verification result for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Available,
    Client,
}

impl Outcome {
    /// Text written to the result column
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Available => "disponível",
            Outcome::Client => "cliente",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    TokenRequested,
    Querying,
    Applying,
    Sleeping,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Still to run (or retrying)
    Pending,
    Resolved { available: usize, client: usize },
    /// Retry cap reached; rows stay unresolved
    Abandoned { last_error: String },
}

/// Rows of one sheet awaiting verification together
#[derive(Debug, Clone)]
pub struct ConsultationBatch {
    pub index: usize,
    /// `(data row index, identifier)` in sheet order
    pub rows: Vec<(usize, Identifier)>,
    pub retries: u32,
    pub state: BatchState,
    pub outcome: BatchOutcome,
}

impl ConsultationBatch {
    pub fn new(index: usize, rows: Vec<(usize, Identifier)>) -> Self {
        Self {
            index,
            rows,
            retries: 0,
            state: BatchState::Idle,
            outcome: BatchOutcome::Pending,
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        self.rows.iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn transition(&mut self, next: BatchState) {
        tracing::trace!(batch = self.index, from = ?self.state, to = ?next, "Batch state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternate_mode_by_batch_parity() {
        let mode = CredentialMode::Alternate;
        assert_eq!(mode.slot_for_batch(0), CredentialSlot::Primary);
        assert_eq!(mode.slot_for_batch(1), CredentialSlot::Secondary);
        assert_eq!(mode.slot_for_batch(2), CredentialSlot::Primary);
        assert_eq!(CredentialMode::Secondary.slot_for_batch(0), CredentialSlot::Secondary);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Available.label(), "disponível");
        assert_eq!(Outcome::Client.label(), "cliente");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("ALTERNATE".parse::<CredentialMode>().unwrap(), CredentialMode::Alternate);
        assert!("both".parse::<CredentialMode>().is_err());
    }
}
