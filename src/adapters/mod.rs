//! Phase executor interface and its implementations.
//!
//! A phase executor performs one stage of the pipeline: it reads the inputs
//! and earlier artifacts, and writes its own artifacts into the workspace.
//! How it does so (an agent framework, a script, a test double) is opaque to
//! the orchestrator.

pub mod command;
pub mod event_log;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::BroadcastHub;
use crate::domain::{CheckpointInfo, LogEvent, Phase};

// Re-export the built-in implementations
pub use command::{CommandExecutor, CommandSpec};
pub use event_log::EventLogSubscriber;

/// Everything a phase executor is given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInputs {
    /// Phase being executed
    pub phase: Phase,

    /// Workspace identifier
    pub run_id: String,

    /// Application under test
    pub target_url: String,

    /// Free-text guidance
    pub instructions: String,

    /// Absolute path of the run workspace
    pub workspace: PathBuf,

    /// Pages the exploration phase should aim for
    pub target_page_count: u32,

    /// Run browsers without a visible window
    pub headless: bool,

    /// Whether the caller asked to redo existing work
    pub force: bool,

    /// Artifacts produced by phases that already completed in this run
    #[serde(default)]
    pub prior_artifacts: BTreeMap<Phase, Vec<PathBuf>>,

    /// Resume hints when continuing an interrupted run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_hints: Option<CheckpointInfo>,
}

/// What an executor reports back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutput {
    /// Short human-readable summary of the work done
    pub summary: String,

    /// Artifacts written, relative to the workspace
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

impl PhaseOutput {
    /// Output with only a summary
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Live output of a running phase.
///
/// Every line becomes a `log` event tagged with the run and phase, delivered
/// to all hub subscribers while the executor is still working.
#[derive(Clone)]
pub struct PhaseLog {
    hub: Arc<BroadcastHub>,
    source: String,
    run_id: String,
    phase: Phase,
}

impl PhaseLog {
    pub fn new(
        hub: Arc<BroadcastHub>,
        source: impl Into<String>,
        run_id: impl Into<String>,
        phase: Phase,
    ) -> Self {
        Self {
            hub,
            source: source.into(),
            run_id: run_id.into(),
            phase,
        }
    }

    /// Broadcast one line of executor output
    pub async fn line(&self, message: impl Into<String>) {
        let event = LogEvent::log(&self.source, message)
            .with_run(&self.run_id)
            .with_phase(self.phase);
        self.hub.broadcast(&event).await;
    }
}

/// Performs one phase of the pipeline
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Do the phase's work, writing artifacts into `inputs.workspace`.
    ///
    /// Progress goes to `log` as it happens. Any error is fatal to the run;
    /// the orchestrator does not retry.
    async fn execute(&self, inputs: &PhaseInputs, log: &PhaseLog) -> Result<PhaseOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_inputs_json_shape() {
        let mut prior = BTreeMap::new();
        prior.insert(
            Phase::Exploration,
            vec![PathBuf::from("discovery_summary.json")],
        );
        let inputs = PhaseInputs {
            phase: Phase::Planning,
            run_id: "run_1".to_string(),
            target_url: "https://example.com".to_string(),
            instructions: String::new(),
            workspace: PathBuf::from("/tmp/run_1"),
            target_page_count: 100,
            headless: true,
            force: false,
            prior_artifacts: prior,
            resume_hints: None,
        };

        let json = serde_json::to_value(&inputs).unwrap();
        assert_eq!(json["phase"], "planning");
        assert_eq!(
            json["prior_artifacts"]["exploration"][0],
            "discovery_summary.json"
        );
        assert!(json.get("resume_hints").is_none());
    }
}
