//! Verification response parsing
//!
//! The API answers with a JSON object holding one array of available
//! identifiers under a key containing "cnpj". The first such field in
//! document order wins; no such field means nothing is available.

use recon_common::{Error, Identifier, Result};
use serde_json::Value;
use std::collections::HashSet;

use crate::models::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResponse {
    Available {
        field: String,
        identifiers: HashSet<Identifier>,
    },
    NoneAvailable,
}

impl VerificationResponse {
    /// Interpret a response body; non-object bodies are `MalformedResponse`
    pub fn parse(body: &Value) -> Result<Self> {
        let Value::Object(fields) = body else {
            return Err(Error::MalformedResponse(format!(
                "Expected a JSON object, got {}",
                kind_of(body)
            )));
        };

        let matched = fields
            .iter()
            .find(|(key, value)| key.to_lowercase().contains("cnpj") && value.is_array());

        let Some((field, Value::Array(items))) = matched else {
            return Ok(VerificationResponse::NoneAvailable);
        };

        let identifiers = items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(Identifier::normalize(s)),
                Value::Number(n) => Some(Identifier::normalize(&n.to_string())),
                _ => None,
            })
            .collect();

        Ok(VerificationResponse::Available {
            field: field.clone(),
            identifiers,
        })
    }

    pub fn outcome_for(&self, id: &Identifier) -> Outcome {
        match self {
            VerificationResponse::Available { identifiers, .. } if identifiers.contains(id) => Outcome::Available,
            _ => Outcome::Client,
        }
    }

    pub fn available_count(&self) -> usize {
        match self {
            VerificationResponse::Available { identifiers, .. } => identifiers.len(),
            VerificationResponse::NoneAvailable => 0,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
