//! Configuration resolution for recon-pipeline
//!
//! Turns the shared `TomlConfig` into typed pipeline settings. Verification
//! credentials resolve with ENV → TOML priority.

use recon_common::config::{CredentialConfig, TomlConfig};
use recon_common::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::consultation::{ConsultationSettings, CredentialSet, Credentials};
use crate::sheet::ColumnRef;
use crate::store::StoreLimits;

/// Environment variable prefixes for the two credential pairs
pub const PRIMARY_ENV_PREFIX: &str = "RECON_PRIMARY";
pub const SECONDARY_ENV_PREFIX: &str = "RECON_SECONDARY";

/// Verification API endpoints and client settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub token_url: Option<String>,
    pub verify_url: Option<String>,
    pub identifier_field: String,
    pub request_timeout: Duration,
    pub requests_per_minute: u32,
}

/// Everything a `Pipeline` needs besides its collaborators
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub history_collection: String,
    pub enrichment_collection: String,
    pub root_collection: String,
    pub limits: StoreLimits,
    pub write_chunk: usize,
    pub delete_chunk: usize,
    pub root_feed_read_batch: usize,
    pub scan_page: usize,
    /// Interval of the scheduled history purge while serving; `None` disables it
    pub purge_interval: Option<Duration>,
    pub identifier_header: String,
    pub phone_prefix: String,
    pub destination_column: ColumnRef,
    pub root_column: ColumnRef,
    pub phone_columns: usize,
    pub enrich_batch_rows: usize,
    pub load_flush_rows: usize,
    pub load_write_chunk: usize,
    pub consultation: ConsultationSettings,
    pub api: ApiSettings,
    pub credentials: CredentialSet,
}

impl PipelineSettings {
    /// Build settings from a parsed config; invalid column selectors are `InvalidInput`
    ///
    /// Credentials resolve from the environment first, then the config.
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        Self::from_config(config, resolve_credentials(config))
    }

    /// Build settings from a parsed config with explicit credentials
    pub fn from_config(config: &TomlConfig, credentials: CredentialSet) -> Result<Self> {
        let consultation = &config.consultation;
        Ok(Self {
            history_collection: config.collections.history.clone(),
            enrichment_collection: config.collections.enrichment.clone(),
            root_collection: config.collections.root.clone(),
            limits: StoreLimits::from(&config.store),
            write_chunk: config.sync.write_chunk,
            delete_chunk: config.sync.delete_chunk,
            root_feed_read_batch: config.sync.root_feed_read_batch,
            scan_page: config.sync.scan_page,
            purge_interval: config
                .sync
                .purge_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            identifier_header: config.cleaning.identifier_header.clone(),
            phone_prefix: config.cleaning.phone_prefix.clone(),
            destination_column: config.cleaning.destination_column.parse()?,
            root_column: config.cleaning.root_column.parse()?,
            phone_columns: config.enrichment.phone_columns,
            enrich_batch_rows: config.enrichment.batch_rows,
            load_flush_rows: config.enrichment.load_flush_rows,
            load_write_chunk: config.enrichment.write_chunk,
            consultation: ConsultationSettings {
                identifier_header: config.cleaning.identifier_header.clone(),
                result_column: consultation.result_column.parse()?,
                batch_size: consultation.batch_size,
                max_retries: consultation.max_retries,
                retry_backoff: Duration::from_secs(consultation.retry_backoff_secs),
                inter_batch_delay: Duration::from_secs(consultation.inter_batch_delay_secs),
            },
            api: ApiSettings {
                token_url: consultation.token_url.clone(),
                verify_url: consultation.verify_url.clone(),
                identifier_field: consultation.identifier_field.clone(),
                request_timeout: Duration::from_secs(consultation.request_timeout_secs),
                requests_per_minute: consultation.requests_per_minute,
            },
            credentials,
        })
    }
}

/// Resolve both credential pairs
pub fn resolve_credentials(config: &TomlConfig) -> CredentialSet {
    CredentialSet {
        primary: resolve_credential(PRIMARY_ENV_PREFIX, "primary", &config.consultation.primary),
        secondary: resolve_credential(SECONDARY_ENV_PREFIX, "secondary", &config.consultation.secondary),
    }
}

/// Resolve one credential pair
///
/// **Priority:** ENV (`<prefix>_CLIENT_ID` + `<prefix>_CLIENT_SECRET`) → TOML.
/// A pair counts only when both halves are non-blank.
pub fn resolve_credential(env_prefix: &str, default_label: &str, toml: &CredentialConfig) -> Option<Credentials> {
    let env_pair = pair(
        std::env::var(format!("{}_CLIENT_ID", env_prefix)).ok(),
        std::env::var(format!("{}_CLIENT_SECRET", env_prefix)).ok(),
    );
    let toml_pair = pair(toml.client_id.clone(), toml.client_secret.clone());
    let label = toml
        .name
        .clone()
        .filter(|n| is_valid_value(n))
        .unwrap_or_else(|| default_label.to_string());

    if env_pair.is_some() && toml_pair.is_some() {
        warn!(
            "{} credentials found in multiple sources: environment, TOML. Using environment (highest priority).",
            label
        );
    }

    let (source, (client_id, client_secret)) = match (env_pair, toml_pair) {
        (Some(p), _) => ("environment", p),
        (None, Some(p)) => ("TOML config", p),
        (None, None) => return None,
    };
    info!("{} credentials loaded from {}", label, source);

    Some(Credentials {
        client_id,
        client_secret,
        label,
    })
}

fn pair(id: Option<String>, secret: Option<String>) -> Option<(String, String)> {
    match (id, secret) {
        (Some(id), Some(secret)) if is_valid_value(&id) && is_valid_value(&secret) => {
            Some((id.trim().to_string(), secret.trim().to_string()))
        }
        _ => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
