//! External identifier verification
//!
//! Each batch obtains a bearer token with client credentials, posts its
//! identifiers, writes `disponível`/`cliente` into the result column and
//! saves the sheet before the next batch starts.

mod api_client;
mod response;
mod runner;

pub use api_client::{HttpVerificationApi, VerificationError};
pub use response::VerificationResponse;
pub use runner::{ConsultationRunner, ConsultationSettings};

use async_trait::async_trait;
use recon_common::{Identifier, Result};

/// Client credentials for the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// Display name used in log messages
    pub label: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("label", &self.label)
            .finish()
    }
}

/// Primary and secondary credential pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    pub primary: Option<Credentials>,
    pub secondary: Option<Credentials>,
}

impl CredentialSet {
    pub fn get(&self, slot: crate::models::CredentialSlot) -> Option<&Credentials> {
        match slot {
            crate::models::CredentialSlot::Primary => self.primary.as_ref(),
            crate::models::CredentialSlot::Secondary => self.secondary.as_ref(),
        }
    }
}

/// Token and verification endpoints
#[async_trait]
pub trait VerificationApi: Send + Sync {
    /// Exchange client credentials for a bearer token
    async fn acquire_token(&self, credentials: &Credentials) -> Result<String>;

    /// Submit identifiers; returns the raw JSON body
    async fn verify(&self, token: &str, identifiers: &[Identifier]) -> Result<serde_json::Value>;
}
