//! Event types for the reconciliation pipeline
//!
//! Every run reports its progress as a stream of `ReconEvent`s on the
//! `EventBus`. Events are serializable so the HTTP layer can forward them
//! over SSE unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Severity of a human-readable log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReconEvent {
    /// A run acquired the pipeline
    RunStarted {
        run_id: Uuid,
        operation: String,
        timestamp: DateTime<Utc>,
    },

    /// Human-readable progress message
    Log {
        run_id: Uuid,
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Per-file progress (0-100)
    FileProgress {
        run_id: Uuid,
        file: String,
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// Batch-level progress (store commits, API batches)
    BatchProgress {
        run_id: Uuid,
        stage: String,
        current: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run finished; `summary` is the final human-readable line
    RunCompleted {
        run_id: Uuid,
        operation: String,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// The run aborted on a global setup error
    RunFailed {
        run_id: Uuid,
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ReconEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ReconEvent::RunStarted { .. } => "RunStarted",
            ReconEvent::Log { .. } => "Log",
            ReconEvent::FileProgress { .. } => "FileProgress",
            ReconEvent::BatchProgress { .. } => "BatchProgress",
            ReconEvent::RunCompleted { .. } => "RunCompleted",
            ReconEvent::RunFailed { .. } => "RunFailed",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            ReconEvent::RunStarted { run_id, .. }
            | ReconEvent::Log { run_id, .. }
            | ReconEvent::FileProgress { run_id, .. }
            | ReconEvent::BatchProgress { run_id, .. }
            | ReconEvent::RunCompleted { run_id, .. }
            | ReconEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for pipeline events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReconEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ReconEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ReconEvent,
    ) -> Result<usize, broadcast::error::SendError<ReconEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ReconEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        bus.emit(ReconEvent::Log {
            run_id,
            level: LogLevel::Info,
            message: "hello".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), run_id);
        assert_eq!(event.event_type(), "Log");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(ReconEvent::RunStarted {
            run_id: Uuid::new_v4(),
            operation: "clean".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ReconEvent::BatchProgress {
            run_id: Uuid::nil(),
            stage: "commit".to_string(),
            current: 1,
            total: 3,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchProgress");
        assert_eq!(json["current"], 1);
    }
}
