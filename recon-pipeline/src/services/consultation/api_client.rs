//! HTTP client for the verification API
//!
//! Token endpoint: form-encoded client-credentials grant answered with
//! `{"access_token": ...}`. Verification endpoint: JSON body
//! `{<identifier_field>: [...]}` with bearer auth. Outbound requests share
//! one rate limiter.

use async_trait::async_trait;
use recon_common::{Identifier, Result};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::{Credentials, VerificationApi};

/// Verification API errors
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Token response has no access_token")]
    MissingToken,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<VerificationError> for recon_common::Error {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Parse(msg) => recon_common::Error::MalformedResponse(msg),
            other => recon_common::Error::ExternalApi(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct HttpVerificationApi {
    client: Client,
    token_url: String,
    verify_url: String,
    identifier_field: String,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpVerificationApi {
    pub fn new(
        token_url: impl Into<String>,
        verify_url: impl Into<String>,
        identifier_field: impl Into<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let per_minute = NonZeroU32::new(requests_per_minute.max(1))
            .ok_or_else(|| recon_common::Error::Config("requests_per_minute must be positive".to_string()))?;
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_minute(per_minute));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| recon_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            verify_url: verify_url.into(),
            identifier_field: identifier_field.into(),
            rate_limiter,
        })
    }

    async fn error_for_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, VerificationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VerificationError::Status(status.as_u16(), body))
    }
}

#[async_trait]
impl VerificationApi for HttpVerificationApi {
    async fn acquire_token(&self, credentials: &Credentials) -> Result<String> {
        self.rate_limiter.until_ready().await;
        debug!(credentials = %credentials.label, "Requesting access token");

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| VerificationError::Network(e.to_string()))?;

        let response = Self::error_for_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Parse(e.to_string()))?;

        match token.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(VerificationError::MissingToken.into()),
        }
    }

    async fn verify(&self, token: &str, identifiers: &[Identifier]) -> Result<serde_json::Value> {
        self.rate_limiter.until_ready().await;
        debug!(count = identifiers.len(), "Submitting identifiers for verification");

        let mut body = serde_json::Map::new();
        body.insert(
            self.identifier_field.clone(),
            serde_json::Value::from(identifiers.iter().map(|id| id.to_string()).collect::<Vec<_>>()),
        );

        let response = self
            .client
            .post(&self.verify_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| VerificationError::Network(e.to_string()))?;

        let response = Self::error_for_status(response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| VerificationError::Network(e.to_string()))?;
        let value = serde_json::from_str(&text).map_err(|e| VerificationError::Parse(e.to_string()))?;
        Ok(value)
    }
}
