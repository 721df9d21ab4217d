//! Progress events streamed to live observers.
//!
//! Events exist only in transit through the broadcast hub. Observers that
//! join late never see earlier events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::Phase;

/// A single progress message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,

    /// Component that emitted the event
    pub source: String,

    /// Human-readable text
    pub message: String,

    /// What the event signals
    pub kind: EventKind,

    /// Run the event belongs to (absent for hub membership notices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Phase the event concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(source: impl Into<String>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            message: message.into(),
            kind,
            run_id: None,
            phase: None,
        }
    }

    /// Plain log line
    pub fn log(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, EventKind::Log, message)
    }

    /// Tag the event with its run
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Tag the event with a phase
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// Kinds of progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Free-form log line
    Log,

    /// A run passed initialization
    PipelineStart,

    /// A phase executor is about to run
    PhaseStart,

    /// A phase finished and its artifacts were accepted
    PhaseComplete,

    /// A phase executor returned an error
    PhaseFailed,

    /// A phase returned but its artifacts are incomplete
    ValidationFailed,

    /// Every requested phase ran
    PipelineComplete,

    /// The run was skipped because its outputs already exist
    PipelineSkipped,
}

impl EventKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Log => "log",
            EventKind::PipelineStart => "pipeline-start",
            EventKind::PhaseStart => "phase-start",
            EventKind::PhaseComplete => "phase-complete",
            EventKind::PhaseFailed => "phase-failed",
            EventKind::ValidationFailed => "validation-failed",
            EventKind::PipelineComplete => "pipeline-complete",
            EventKind::PipelineSkipped => "pipeline-skipped",
        }
    }
}
