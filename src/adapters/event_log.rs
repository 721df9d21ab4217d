//! Subscriber that keeps a JSONL record of each run's events.
//!
//! Events tagged with a run id are appended to `logs/events.jsonl` inside
//! that run's workspace; untagged events (hub membership notices) are
//! ignored. This is an optional observer; the orchestrator itself persists
//! nothing.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::core::broadcast::{DeliveryError, Subscriber};
use crate::core::workspace::RunWorkspace;
use crate::domain::LogEvent;

/// File name of the per-run event log
pub const EVENT_LOG_FILE: &str = "events.jsonl";

/// Appends run events to the run's workspace
pub struct EventLogSubscriber {
    workspace: RunWorkspace,
    // Serializes appends from concurrent broadcasts
    write_lock: Mutex<()>,
}

impl EventLogSubscriber {
    pub fn new(workspace: RunWorkspace) -> Self {
        Self {
            workspace,
            write_lock: Mutex::new(()),
        }
    }

    fn log_path(&self, run_id: &str) -> Result<PathBuf, DeliveryError> {
        self.workspace
            .path_for(run_id)
            .map(|dir| dir.join("logs").join(EVENT_LOG_FILE))
            .map_err(|e| DeliveryError::Failed(e.to_string()))
    }

    /// Read back every recorded event for a run, oldest first
    pub async fn replay(&self, run_id: &str) -> anyhow::Result<Vec<LogEvent>> {
        let path = self.log_path(run_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            // Skip lines cut short by a crash mid-write
            if let Ok(event) = serde_json::from_str::<LogEvent>(&line) {
                events.push(event);
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl Subscriber for EventLogSubscriber {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn deliver(&self, event: &LogEvent) -> Result<(), DeliveryError> {
        let Some(run_id) = event.run_id.as_deref() else {
            return Ok(());
        };
        let path = self.log_path(run_id)?;
        let json =
            serde_json::to_string(event).map_err(|e| DeliveryError::Failed(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;

        Ok(())
    }
}
