use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use appointflow_core::event::EventBus;
use appointflow_core::types::RunEvent;

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per event to
/// `{log_dir}/{YYYYmmdd}.jsonl`. Lines are flushed as they are written, so a
/// crash never leaves a partial earlier entry behind.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = run start/finish, 2 = per step too.
    pub fn new(log_dir: impl Into<PathBuf>, level: u8) -> Self {
        Self {
            log_dir: log_dir.into(),
            level,
        }
    }

    /// Path of today's log file.
    pub fn current_path(&self) -> PathBuf {
        log_path(&self.log_dir)
    }

    /// Write events until cancelled or the bus closes.
    ///
    /// The subscription is taken before the future is returned, so events
    /// published right after spawning are not lost.
    pub fn run(
        self,
        event_bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> impl Future<Output = ()> + Send {
        let rx = event_bus.subscribe();
        self.write_events(rx, cancel)
    }

    async fn write_events(self, mut rx: Receiver<RunEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let path = self.current_path();
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %path.display(), "RunLogger started");
        let mut writer = BufWriter::new(file);

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if !self.write_event(&mut writer, &event).await {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    // Keep what was published before the cancel.
                    while let Ok(event) = rx.try_recv() {
                        if !self.write_event(&mut writer, &event).await {
                            break;
                        }
                    }
                    debug!("RunLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %path.display(), "RunLogger finished");
    }

    /// Append one event. Returns false once the file can no longer be written.
    async fn write_event(&self, writer: &mut BufWriter<File>, event: &RunEvent) -> bool {
        let Some(entry) = self.event_to_entry(event) else {
            return true;
        };
        let Ok(json) = serde_json::to_string(&entry) else {
            return true;
        };
        let line = format!("{}\n", json);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!(error = %e, "Failed to write log entry");
            return false;
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "Failed to flush log");
        }
        true
    }

    fn event_to_entry(&self, event: &RunEvent) -> Option<LogEntry> {
        let timestamp = Utc::now().to_rfc3339();
        let run_id = event.run_id().to_string();

        match event {
            RunEvent::RunStarted { .. } => Some(LogEntry {
                timestamp,
                run_id,
                event_type: "run_started",
                step: None,
                detail: None,
            }),
            RunEvent::RunFinished {
                status,
                route_trace,
                ..
            } => Some(LogEntry {
                timestamp,
                run_id,
                event_type: "run_finished",
                step: None,
                detail: Some(serde_json::json!({
                    "terminal_status": status,
                    "route_trace": route_trace,
                })),
            }),
            RunEvent::StepCompleted {
                step,
                step_calls,
                status,
                ..
            } if self.level >= 2 => Some(LogEntry {
                timestamp,
                run_id,
                event_type: "step_completed",
                step: Some(step.clone()),
                detail: Some(serde_json::json!({
                    "step_calls": step_calls,
                    "terminal_status": status,
                })),
            }),
            _ => None,
        }
    }
}

fn log_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.jsonl", Utc::now().format("%Y%m%d")))
}
