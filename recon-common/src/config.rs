//! Configuration loading and root folder resolution
//!
//! Configuration lives in a single TOML file. Every field has a built-in
//! default so a missing or partial file never prevents startup.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`RECON_CONFIG`, `RECON_ROOT_FOLDER`, credentials)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML file
pub const CONFIG_ENV_VAR: &str = "RECON_CONFIG";

/// Environment variable naming the root data folder
pub const ROOT_FOLDER_ENV_VAR: &str = "RECON_ROOT_FOLDER";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the local store database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub collections: CollectionsConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub cleaning: CleaningConfig,

    #[serde(default)]
    pub consultation: ConsultationConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Document store backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file, relative paths resolve against the root folder
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Maximum documents per atomic batch write
    #[serde(default = "default_max_batch_writes")]
    pub max_batch_writes: usize,

    /// Maximum keys per "key in set" query
    #[serde(default = "default_max_in_keys")]
    pub max_in_keys: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            max_batch_writes: default_max_batch_writes(),
            max_in_keys: default_max_in_keys(),
        }
    }
}

/// Remote collection names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_history_collection")]
    pub history: String,
    #[serde(default = "default_enrichment_collection")]
    pub enrichment: String,
    #[serde(default = "default_root_collection")]
    pub root: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            history: default_history_collection(),
            enrichment: default_enrichment_collection(),
            root: default_root_collection(),
        }
    }
}

/// Chunk sizes for store synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Documents per commit chunk (kept below the store write limit)
    #[serde(default = "default_write_chunk")]
    pub write_chunk: usize,

    /// Documents per delete chunk
    #[serde(default = "default_delete_chunk")]
    pub delete_chunk: usize,

    /// Unique keys read from a file before feeding them to the root collection
    #[serde(default = "default_root_feed_read_batch")]
    pub root_feed_read_batch: usize,

    /// Documents per page when scanning a whole collection
    #[serde(default = "default_scan_page")]
    pub scan_page: usize,

    /// Seconds between scheduled purges of the history collection while
    /// serving; unset or 0 disables the schedule
    #[serde(default)]
    pub purge_interval_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_chunk: default_write_chunk(),
            delete_chunk: default_delete_chunk(),
            root_feed_read_batch: default_root_feed_read_batch(),
            scan_page: default_scan_page(),
            purge_interval_secs: None,
        }
    }
}

/// Clean pass settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Header of the identifier column
    #[serde(default = "default_identifier_header")]
    pub identifier_header: String,

    /// Phone columns are the headers starting with this prefix
    #[serde(default = "default_phone_prefix")]
    pub phone_prefix: String,

    /// Destination column matched against the root set (`B` or `header:<name>`)
    #[serde(default = "default_destination_column")]
    pub destination_column: String,

    /// Column of a root file holding the reference values
    #[serde(default = "default_root_column")]
    pub root_column: String,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            identifier_header: default_identifier_header(),
            phone_prefix: default_phone_prefix(),
            destination_column: default_destination_column(),
            root_column: default_root_column(),
        }
    }
}

/// One client-credentials pair for the verification API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Display name used in progress logs
    #[serde(default)]
    pub name: Option<String>,
}

/// External verification API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationConfig {
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub verify_url: Option<String>,

    /// JSON field carrying the identifier array in the verification request
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,

    /// Column receiving the verification result (`C` or `header:<name>`)
    #[serde(default = "default_result_column")]
    pub result_column: String,

    #[serde(default = "default_consult_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    #[serde(default = "default_inter_batch_delay_secs")]
    pub inter_batch_delay_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Outbound request quota (token + verification calls)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default)]
    pub primary: CredentialConfig,

    #[serde(default)]
    pub secondary: CredentialConfig,
}

impl Default for ConsultationConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            verify_url: None,
            identifier_field: default_identifier_field(),
            result_column: default_result_column(),
            batch_size: default_consult_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            inter_batch_delay_secs: default_inter_batch_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_minute: default_requests_per_minute(),
            primary: CredentialConfig::default(),
            secondary: CredentialConfig::default(),
        }
    }
}

/// Enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Number of `foneN` columns created by header preparation and exports
    #[serde(default = "default_phone_columns")]
    pub phone_columns: usize,

    /// Rows looked up per enrichment batch
    #[serde(default = "default_enrich_batch_rows")]
    pub batch_rows: usize,

    /// Rows aggregated before flushing a load pass to the store
    #[serde(default = "default_load_flush_rows")]
    pub load_flush_rows: usize,

    /// Documents per enrichment write chunk
    #[serde(default = "default_load_write_chunk")]
    pub write_chunk: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            phone_columns: default_phone_columns(),
            batch_rows: default_enrich_batch_rows(),
            load_flush_rows: default_load_flush_rows(),
            write_chunk: default_load_write_chunk(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_database() -> PathBuf {
    PathBuf::from("recon.db")
}
fn default_max_batch_writes() -> usize {
    500
}
fn default_max_in_keys() -> usize {
    30
}
fn default_history_collection() -> String {
    "cnpjs_armazenados".to_string()
}
fn default_enrichment_collection() -> String {
    "cnpjs_enriquecidos".to_string()
}
fn default_root_collection() -> String {
    "Raiz".to_string()
}
fn default_write_chunk() -> usize {
    499
}
fn default_delete_chunk() -> usize {
    500
}
fn default_root_feed_read_batch() -> usize {
    5000
}
fn default_scan_page() -> usize {
    1000
}
fn default_identifier_header() -> String {
    "cpf".to_string()
}
fn default_phone_prefix() -> String {
    "fone".to_string()
}
fn default_destination_column() -> String {
    "A".to_string()
}
fn default_root_column() -> String {
    "A".to_string()
}
fn default_identifier_field() -> String {
    "CNPJ".to_string()
}
fn default_result_column() -> String {
    "C".to_string()
}
fn default_consult_batch_size() -> usize {
    20_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_secs() -> u64 {
    6 * 60
}
fn default_inter_batch_delay_secs() -> u64 {
    3 * 60
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_phone_columns() -> usize {
    14
}
fn default_enrich_batch_rows() -> usize {
    2000
}
fn default_load_flush_rows() -> usize {
    5000
}
fn default_load_write_chunk() -> usize {
    400
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load configuration, falling back to defaults when the file is absent or invalid
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        info!("No configuration file found, using built-in defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        warn!("Configuration file {} not found, using built-in defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => {
            info!("Configuration loaded from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using built-in defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write configuration atomically (temp file in the same directory, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        Error::Io(e)
    })
}

/// Locate the configuration file
///
/// Priority: command-line argument, `RECON_CONFIG`, then
/// `<config dir>/recon/recon.toml` if it exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("recon").join("recon.toml"))
        .filter(|p| p.exists())
}

/// Resolve the root data folder
///
/// Priority: command-line argument, `RECON_ROOT_FOLDER`, TOML `root_folder`,
/// then the OS-dependent default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("recon"))
        .unwrap_or_else(|| PathBuf::from("./recon_data"))
}

/// Absolute database path for the configured store
pub fn database_path(root_folder: &Path, store: &StoreConfig) -> PathBuf {
    if store.database.is_absolute() {
        store.database.clone()
    } else {
        root_folder.join(&store.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_store_limits() {
        let config = TomlConfig::default();
        assert!(config.sync.write_chunk < config.store.max_batch_writes);
        assert!(config.store.max_in_keys < config.sync.write_chunk);
        assert_eq!(config.consultation.batch_size, 20_000);
        assert_eq!(config.consultation.max_retries, 3);
        assert_eq!(config.enrichment.phone_columns, 14);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [consultation]
            batch_size = 10
            verify_url = "http://localhost/verify"
            "#,
        )
        .unwrap();

        assert_eq!(config.consultation.batch_size, 10);
        assert_eq!(config.consultation.verify_url.as_deref(), Some("http://localhost/verify"));
        assert_eq!(config.consultation.identifier_field, "CNPJ");
        assert_eq!(config.collections.history, "cnpjs_armazenados");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_database_path_relative_and_absolute() {
        let root = Path::new("/data/recon");
        let relative = StoreConfig::default();
        assert_eq!(database_path(root, &relative), PathBuf::from("/data/recon/recon.db"));

        let absolute = StoreConfig {
            database: PathBuf::from("/var/lib/store.db"),
            ..StoreConfig::default()
        };
        assert_eq!(database_path(root, &absolute), PathBuf::from("/var/lib/store.db"));
    }
}
