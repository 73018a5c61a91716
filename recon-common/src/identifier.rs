//! Tax identifier normalization
//!
//! Business (CNPJ, 14 digits) and personal (CPF, 11 digits) identifiers share
//! one key space: every raw value is reduced to its digits and left-padded
//! with zeros to 14 characters. Longer inputs are kept whole.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the canonical identifier key
pub const IDENTIFIER_WIDTH: usize = 14;

/// Canonical identifier: digits only, at least 14 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Normalize a raw cell value into its canonical form
    pub fn normalize(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Strip every non-digit character
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonical string form of a raw identifier
///
/// Never fails and never truncates: empty input yields fourteen zeros.
pub fn normalize(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() >= IDENTIFIER_WIDTH {
        digits
    } else {
        format!("{:0>width$}", digits, width = IDENTIFIER_WIDTH)
    }
}
