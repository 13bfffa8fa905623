use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use syncup_core::event::EventBus;
use syncup_core::types::{GraphEvent, RunId};

/// JSONL run logger.
///
/// Listens on the [`EventBus`] and appends one JSON object per line to
/// `{log_dir}/{run_id}/{timestamp}.jsonl`. Lines already written survive a
/// crash mid-run.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level`: 1 = run summary and failures, 2 = per node, 3 = routing.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and write in a background task.
    ///
    /// Subscribing before the task starts means no event published after
    /// this call is missed.
    pub fn spawn(
        self,
        bus: &Arc<EventBus>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx, run_id, cancel))
    }

    /// Write entries for `run_id` until the run finishes or `cancel` fires.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<GraphEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) {
        let run_dir = self.log_dir.join(run_id.as_str());
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id() != &run_id {
                                continue;
                            }
                            if let Some(entry) = self.event_to_entry(&event) {
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }
                            if matches!(event, GraphEvent::RunFinished { .. }) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Returns `None` when the event is filtered out by the level.
    fn event_to_entry(&self, event: &GraphEvent) -> Option<LogEntry> {
        let entry = |event_type, node: Option<&str>, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type,
            node: node.map(str::to_string),
            detail,
        };

        match event {
            GraphEvent::RunStarted { graph, .. } => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({ "graph": graph })),
            )),
            GraphEvent::RunFinished {
                status,
                invocations,
                ..
            } => Some(entry(
                "run_finished",
                None,
                Some(serde_json::json!({ "status": status, "invocations": invocations })),
            )),
            GraphEvent::NodeFailed { node, error, .. } => Some(entry(
                "node_failed",
                Some(node.as_str()),
                Some(serde_json::json!({ "error": error })),
            )),

            GraphEvent::NodeStarted {
                node, invocation, ..
            } if self.level >= 2 => Some(entry(
                "node_started",
                Some(node.as_str()),
                Some(serde_json::json!({ "invocation": invocation })),
            )),
            GraphEvent::NodeCompleted {
                node,
                elapsed_ms,
                fields,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(node.as_str()),
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms, "fields": fields })),
            )),

            GraphEvent::Routed {
                from, label, to, ..
            } if self.level >= 3 => Some(entry(
                "routed",
                Some(from.as_str()),
                Some(serde_json::json!({ "label": label, "to": to })),
            )),

            _ => None,
        }
    }
}
