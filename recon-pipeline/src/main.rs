//! recon-pipeline - tax-ID reconciliation and enrichment
//!
//! Every pipeline operation is available as a subcommand; `serve` exposes
//! the same operations over HTTP with SSE progress.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recon_common::config::{self, TomlConfig};
use recon_common::events::EventBus;
use serde::Serialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recon_pipeline::config::PipelineSettings;
use recon_pipeline::models::{CredentialMode, MergeStrategy};
use recon_pipeline::services::consultation::HttpVerificationApi;
use recon_pipeline::sheet::CsvSource;
use recon_pipeline::store::SqliteStore;
use recon_pipeline::utils::LogPrinter;
use recon_pipeline::workflow::{spawn_scheduled_purge, CleanRequest, Pipeline, RootSource};
use recon_pipeline::AppState;

/// Command-line arguments for recon-pipeline
#[derive(Parser, Debug)]
#[command(name = "recon-pipeline")]
#[command(about = "Tax-ID reconciliation, verification and enrichment pipeline")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Root folder holding the local document store
    #[arg(short, long, env = config::ROOT_FOLDER_ENV_VAR)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP control API
    Serve {
        #[arg(short, long, default_value = "5790", env = "RECON_PORT")]
        port: u16,
    },
    /// Clean files against a root set and the history
    Clean {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Load the root set from the root collection
        #[arg(long, conflicts_with = "root_file")]
        remote_root: bool,
        /// Load the root set from a column of this file
        #[arg(long)]
        root_file: Option<PathBuf>,
        /// Root file column (`A` or `header:<name>`)
        #[arg(long)]
        root_column: Option<String>,
        /// Destination column matched against the root set
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        backup: bool,
        /// Drop rows whose identifier is already in history
        #[arg(long)]
        check_history: bool,
        /// Save new identifiers to history under a fresh batch id
        #[arg(long)]
        persist: bool,
        /// Compact phone columns after cleaning
        #[arg(long)]
        auto_adjust: bool,
    },
    /// Drop rows whose identifier is already in history
    CleanHistory {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        persist: bool,
    },
    /// Verify identifiers against the external API
    Consult {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// primary, secondary or alternate
        #[arg(long, default_value = "primary")]
        mode: CredentialMode,
    },
    /// Fill phone columns from the enrichment collection
    Enrich {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// overwrite, append or ignore
        #[arg(long)]
        strategy: MergeStrategy,
        #[arg(long)]
        backup: bool,
    },
    /// Load master files into the enrichment collection
    LoadEnrichment {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Add identifiers of each file to the root collection
    FeedRoot {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete every history document of a batch
    DeleteBatch { batch_id: String },
    /// Delete the whole history collection
    PurgeHistory,
    /// Merge blocklist values into the root file
    UpdateBlocklist {
        blocklist: PathBuf,
        root: PathBuf,
        #[arg(long)]
        backup: bool,
    },
    /// Shift phones left in a file
    AdjustPhones {
        file: PathBuf,
        #[arg(long)]
        backup: bool,
    },
    /// Append missing phone headers
    PreparePhones {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Concatenate files under the first file's header
    Merge {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the history mirror to a file
    ExportHistory { dest: PathBuf },
    /// Write the enrichment collection to a file
    ExportEnrichment { dest: PathBuf },
    /// Show mirror size and collection counts
    Stats,
    /// Write the effective configuration to a TOML file
    WriteConfig { dest: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref());
    let toml_config = config::load_or_default(config_path.as_deref());

    let default_filter = format!(
        "recon_pipeline={level},recon_common={level},tower_http=info",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting recon-pipeline {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    if let Command::WriteConfig { dest } = &args.command {
        config::write_toml_config(&toml_config, dest)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        info!("Configuration written to {}", dest.display());
        return Ok(());
    }

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let pipeline = Arc::new(build_pipeline(&toml_config, &root_folder).await?);
    let loaded = pipeline.load_history().await;
    info!("History mirror loaded with {} identifiers", loaded);

    match args.command {
        Command::Serve { port } => serve(pipeline, port).await,
        command => {
            let printer = LogPrinter::spawn(pipeline.event_bus(), |level, message| {
                eprintln!("[{:?}] {}", level, message);
            });
            let result = run_command(&pipeline, command).await;
            printer.finish().await;
            result
        }
    }
}

async fn build_pipeline(toml_config: &TomlConfig, root_folder: &Path) -> Result<Pipeline> {
    let settings = PipelineSettings::from_toml(toml_config).context("Invalid configuration")?;

    let db_path = config::database_path(root_folder, &toml_config.store);
    info!("Document store: {}", db_path.display());
    let store = SqliteStore::open(&db_path, settings.limits)
        .await
        .context("Failed to open document store")?;

    let api = match (&settings.api.token_url, &settings.api.verify_url) {
        (Some(token_url), Some(verify_url)) => Some(HttpVerificationApi::new(
            token_url.clone(),
            verify_url.clone(),
            settings.api.identifier_field.clone(),
            settings.api.request_timeout,
            settings.api.requests_per_minute,
        )?),
        _ => {
            info!("Verification API not configured; consult is unavailable");
            None
        }
    };

    let event_bus = EventBus::new(1000);
    let mut pipeline = Pipeline::new(Arc::new(store), Arc::new(CsvSource::default()), settings, event_bus);
    if let Some(api) = api {
        pipeline = pipeline.with_api(Arc::new(api));
    }
    Ok(pipeline)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_command(pipeline: &Pipeline, command: Command) -> Result<()> {
    match command {
        Command::Clean {
            files,
            remote_root,
            root_file,
            root_column,
            destination,
            backup,
            check_history,
            persist,
            auto_adjust,
        } => {
            let root = match (remote_root, root_file) {
                (true, _) => RootSource::Remote,
                (false, Some(path)) => RootSource::File {
                    path,
                    column: root_column,
                },
                (false, None) => RootSource::None,
            };
            let request = CleanRequest {
                files,
                root,
                destination,
                backup,
                check_history,
                persist,
                auto_adjust,
            };
            let permit = pipeline.try_begin("clean")?;
            print_json(&pipeline.clean(permit, request).await?)
        }
        Command::CleanHistory { files, persist } => {
            let permit = pipeline.try_begin("clean-history")?;
            print_json(&pipeline.clean_by_history(permit, files, persist).await?)
        }
        Command::Consult { files, mode } => {
            let permit = pipeline.try_begin("consult")?;
            print_json(&pipeline.consult(permit, files, mode).await?)
        }
        Command::Enrich {
            files,
            strategy,
            backup,
        } => {
            let permit = pipeline.try_begin("enrich")?;
            print_json(&pipeline.enrich(permit, files, strategy, backup).await?)
        }
        Command::LoadEnrichment { files } => {
            let permit = pipeline.try_begin("enrichment-load")?;
            print_json(&pipeline.load_enrichment(permit, files).await?)
        }
        Command::FeedRoot { files } => {
            let permit = pipeline.try_begin("feed-root")?;
            print_json(&pipeline.feed_root(permit, files).await?)
        }
        Command::DeleteBatch { batch_id } => print_json(&pipeline.delete_batch(&batch_id).await?),
        Command::PurgeHistory => {
            let permit = pipeline.try_begin("purge-history")?;
            print_json(&pipeline.purge_history(permit).await?)
        }
        Command::UpdateBlocklist {
            blocklist,
            root,
            backup,
        } => {
            let permit = pipeline.try_begin("update-blocklist")?;
            print_json(&pipeline.update_blocklist(permit, blocklist, root, backup).await?)
        }
        Command::AdjustPhones { file, backup } => {
            let permit = pipeline.try_begin("adjust-phones")?;
            let rows = pipeline.adjust_phones(permit, file, backup).await?;
            info!("Phones adjusted on {} rows", rows);
            Ok(())
        }
        Command::PreparePhones { files } => {
            let permit = pipeline.try_begin("prepare-phone-headers")?;
            let prepared = pipeline.prepare_phone_headers(permit, files).await?;
            info!("{} file(s) updated", prepared.len());
            Ok(())
        }
        Command::Merge { files, output } => {
            let permit = pipeline.try_begin("merge")?;
            let rows = pipeline.merge_files(permit, files, output.clone()).await?;
            info!("{} rows written to {}", rows, output.display());
            Ok(())
        }
        Command::ExportHistory { dest } => {
            let rows = pipeline.export_history(&dest).await?;
            info!("{} identifiers exported to {}", rows, dest.display());
            Ok(())
        }
        Command::ExportEnrichment { dest } => {
            let rows = pipeline.export_enrichment(&dest).await?;
            info!("{} records exported to {}", rows, dest.display());
            Ok(())
        }
        Command::Stats => print_json(&pipeline.stats().await?),
        Command::Serve { .. } | Command::WriteConfig { .. } => Ok(()),
    }
}

async fn serve(pipeline: Arc<Pipeline>, port: u16) -> Result<()> {
    let purge = pipeline
        .settings()
        .purge_interval
        .map(|every| spawn_scheduled_purge(pipeline.clone(), every));
    let app = recon_pipeline::build_router(AppState::new(pipeline));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(purge) = purge {
        purge.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
