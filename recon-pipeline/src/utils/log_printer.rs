//! Forwards `Log` events of a run to a sink (stderr for the CLI)

use recon_common::events::{EventBus, LogLevel, ReconEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct LogPrinter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LogPrinter {
    /// Subscribe to `bus` and hand every log message to `sink`
    pub fn spawn<F>(bus: &EventBus, mut sink: F) -> Self
    where
        F: FnMut(LogLevel, String) + Send + 'static,
    {
        let mut rx = bus.subscribe();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut forward = |event: ReconEvent| {
                if let ReconEvent::Log { level, message, .. } = event {
                    sink(level, message);
                }
            };

            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(event) => forward(event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Log printer lagged, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stopped => {
                        while let Ok(event) = rx.try_recv() {
                            forward(event);
                        }
                        break;
                    }
                }
            }
        });

        Self { stop, handle }
    }

    /// Forward whatever is still queued, then stop
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!("Log printer ended abnormally: {}", e);
        }
    }
}
