//! Pipeline orchestration
//!
//! `Pipeline` owns the collaborators (document store, tabular source,
//! verification API, sleeper), the settings, the event bus and the in-memory
//! history mirror. Every run operation consumes a `RunPermit`, so at most one
//! run touches files and the mirror at a time.
//!
//! # Error Handling
//! - Per-file errors are logged and the run moves on to the next file
//! - Only global setup errors (root set cannot load, no API configured)
//!   fail the whole run

mod clean;
mod enrichment;
mod maintenance;

pub use clean::{CleanRequest, RootSource};

use recon_common::events::EventBus;
use recon_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::models::{ConsultationReport, CredentialMode, HistorySet, PipelineStats};
use crate::services::consultation::{ConsultationRunner, VerificationApi};
use crate::services::reference_loader;
use crate::services::Reporter;
use crate::sheet::TabularSource;
use crate::store::DocumentStore;
use crate::utils::{Sleeper, TokioSleeper};

/// Exclusive right to run one pipeline operation
///
/// Dropping the permit releases the pipeline.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
    run_id: Uuid,
    operation: String,
}

impl RunPermit {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl std::fmt::Debug for RunPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPermit")
            .field("run_id", &self.run_id)
            .field("operation", &self.operation)
            .finish()
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    source: Arc<dyn TabularSource>,
    api: Option<Arc<dyn VerificationApi>>,
    sleeper: Arc<dyn Sleeper>,
    settings: PipelineSettings,
    event_bus: EventBus,
    history: RwLock<HistorySet>,
    run_lock: Arc<Mutex<()>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn TabularSource>,
        settings: PipelineSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            source,
            api: None,
            sleeper: Arc::new(TokioSleeper),
            settings,
            event_bus,
            history: RwLock::new(HistorySet::new()),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Attach the verification API used by `consult`
    pub fn with_api(mut self, api: Arc<dyn VerificationApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Replace the sleeper used for consultation backoff and throttling
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Acquire the pipeline for `operation`; `Conflict` while another run is active
    pub fn try_begin(&self, operation: &str) -> Result<RunPermit> {
        let guard = self
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::Conflict("Another run is already in progress".to_string()))?;

        let permit = RunPermit {
            _guard: guard,
            run_id: Uuid::new_v4(),
            operation: operation.to_string(),
        };
        info!(run_id = %permit.run_id, operation, "Run permit granted");
        Ok(permit)
    }

    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    fn reporter(&self, permit: &RunPermit) -> Reporter {
        Reporter::new(self.event_bus.clone(), permit.run_id)
    }

    /// Report the end of a run and hand the result back
    fn finish<T>(
        reporter: &Reporter,
        operation: &str,
        result: Result<T>,
        summarize: impl FnOnce(&T) -> String,
    ) -> Result<T> {
        match &result {
            Ok(value) => reporter.completed(operation, summarize(value)),
            Err(e) => reporter.failed(operation, e),
        }
        result
    }

    /// Fill the history mirror from the history collection
    ///
    /// Never fails: an unreadable store leaves the mirror empty.
    pub async fn load_history(&self) -> usize {
        let reporter = Reporter::new(self.event_bus.clone(), Uuid::nil());
        let loaded = reference_loader::load_history(
            self.store.as_ref(),
            &self.settings.history_collection,
            self.settings.scan_page,
            &reporter,
        )
        .await;

        let mut history = self.history.write().await;
        *history = loaded;
        history.len()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Verify identifiers of each file against the external API
    pub async fn consult(
        &self,
        permit: RunPermit,
        files: Vec<PathBuf>,
        mode: CredentialMode,
    ) -> Result<Vec<ConsultationReport>> {
        const OP: &str = "consult";
        let reporter = self.reporter(&permit);
        reporter.started(OP);

        let result = match &self.api {
            Some(api) => {
                let runner = ConsultationRunner::new(
                    api.as_ref(),
                    self.source.as_ref(),
                    self.sleeper.as_ref(),
                    &self.settings.credentials,
                    &self.settings.consultation,
                    &reporter,
                );
                Ok(runner.run_queue(&files, mode).await)
            }
            None => Err(Error::Config(
                "Verification API is not configured (consultation.token_url / verify_url)".to_string(),
            )),
        };

        Self::finish(&reporter, OP, result, |reports| {
            let available: usize = reports.iter().map(|r| r.available).sum();
            let client: usize = reports.iter().map(|r| r.client).sum();
            let abandoned: usize = reports.iter().map(|r| r.abandoned_batches).sum();
            format!(
                "{} file(s): {} available, {} client, {} batch(es) abandoned",
                reports.len(),
                available,
                client,
                abandoned
            )
        })
    }

    /// Mirror size plus document counts of each collection
    pub async fn stats(&self) -> Result<PipelineStats> {
        let store = self.store.as_ref();
        Ok(PipelineStats {
            history_mirror: self.history.read().await.len(),
            history_collection: store.count(&self.settings.history_collection).await?,
            enrichment_collection: store.count(&self.settings.enrichment_collection).await?,
            root_collection: store.count(&self.settings.root_collection).await?,
            run_active: self.is_busy(),
        })
    }
}

/// Purge the history collection every `every`, starting one interval from now
///
/// A tick that finds another run active is skipped.
pub fn spawn_scheduled_purge(pipeline: Arc<Pipeline>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));
    info!(interval_secs = every.as_secs(), "Scheduled history purge enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            ticker.tick().await;
            match pipeline.try_begin("purge-history") {
                Ok(permit) => {
                    if let Err(e) = pipeline.purge_history(permit).await {
                        warn!("Scheduled history purge failed: {}", e);
                    }
                }
                Err(_) => warn!("Scheduled history purge skipped: another run is active"),
            }
        }
    })
}

/// File name for log messages
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// `FileIo` unless the file exists
fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::FileIo(format!("File not found: {}", path.display())))
    }
}
