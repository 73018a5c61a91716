//! Run progress reporting
//!
//! Mirrors every message to `tracing` and, when attached to a bus, to the
//! `EventBus` as `ReconEvent`s tagged with the run id.

use recon_common::events::{EventBus, LogLevel, ReconEvent};
use recon_common::time::now;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Reporter {
    bus: Option<EventBus>,
    run_id: Uuid,
}

impl Reporter {
    pub fn new(bus: EventBus, run_id: Uuid) -> Self {
        Self {
            bus: Some(bus),
            run_id,
        }
    }

    /// Tracing only
    pub fn silent() -> Self {
        Self {
            bus: None,
            run_id: Uuid::nil(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn emit(&self, event: ReconEvent) {
        if let Some(bus) = &self.bus {
            bus.emit_lossy(event);
        }
    }

    fn log(&self, level: LogLevel, message: String) {
        self.emit(ReconEvent::Log {
            run_id: self.run_id,
            level,
            message,
            timestamp: now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(run_id = %self.run_id, "{}", message);
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(run_id = %self.run_id, "{}", message);
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(run_id = %self.run_id, "{}", message);
        self.log(LogLevel::Error, message);
    }

    pub fn file_progress(&self, file: &str, percent: u8) {
        self.emit(ReconEvent::FileProgress {
            run_id: self.run_id,
            file: file.to_string(),
            percent: percent.min(100),
            timestamp: now(),
        });
    }

    pub fn batch_progress(&self, stage: &str, current: usize, total: usize) {
        tracing::debug!(run_id = %self.run_id, stage, current, total, "Batch progress");
        self.emit(ReconEvent::BatchProgress {
            run_id: self.run_id,
            stage: stage.to_string(),
            current,
            total,
            timestamp: now(),
        });
    }

    pub fn started(&self, operation: &str) {
        info!(run_id = %self.run_id, operation, "Run started");
        self.emit(ReconEvent::RunStarted {
            run_id: self.run_id,
            operation: operation.to_string(),
            timestamp: now(),
        });
    }

    pub fn completed(&self, operation: &str, summary: impl Into<String>) {
        let summary = summary.into();
        info!(run_id = %self.run_id, operation, "Run completed: {}", summary);
        self.emit(ReconEvent::RunCompleted {
            run_id: self.run_id,
            operation: operation.to_string(),
            summary,
            timestamp: now(),
        });
    }

    pub fn failed(&self, operation: &str, err: &recon_common::Error) {
        error!(run_id = %self.run_id, operation, error = %err, "Run failed");
        self.emit(ReconEvent::RunFailed {
            run_id: self.run_id,
            operation: operation.to_string(),
            error: err.to_string(),
            timestamp: now(),
        });
    }
}

/// Integer percentage of `done` over `total` (100 when total is 0)
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
