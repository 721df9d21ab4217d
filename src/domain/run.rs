//! Run configuration, live run state and the aggregated result.
//!
//! A `PipelineRun` is mutated only by the orchestrator driving it. The
//! workspace on disk outlives it as the durable record of the run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::{CheckpointInfo, ValidationResult};
use super::phase::Phase;

/// Default number of pages the exploration phase aims to discover
pub const DEFAULT_TARGET_PAGE_COUNT: u32 = 100;

/// Generate a run identifier from the current UTC time
pub fn generate_run_id() -> String {
    format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Immutable configuration of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Workspace identifier
    pub run_id: String,

    /// Application under test
    pub target_url: String,

    /// Free-text guidance passed to every executor
    pub instructions: String,

    /// Phases to execute (visited in canonical order)
    pub phases: Vec<Phase>,

    /// Bypass skip-if-exists and validation halts
    pub force: bool,

    /// Run browsers without a visible window
    pub headless: bool,

    /// Pages the exploration phase should aim for
    pub target_page_count: u32,

    /// Hints for continuing an interrupted run
    pub resume_hints: Option<CheckpointInfo>,
}

impl RunConfig {
    /// Configuration with defaults: generated run id, exploration only
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            run_id: generate_run_id(),
            target_url: target_url.into(),
            instructions: String::new(),
            phases: vec![Phase::Exploration],
            force: false,
            headless: false,
            target_page_count: DEFAULT_TARGET_PAGE_COUNT,
            resume_hints: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_target_page_count(mut self, count: u32) -> Self {
        self.target_page_count = count;
        self
    }

    pub fn with_resume_hints(mut self, hints: CheckpointInfo) -> Self {
        self.resume_hints = Some(hints);
        self
    }

    /// Requested phases in execution order
    pub fn ordered_phases(&self) -> Vec<Phase> {
        Phase::in_canonical_order(&self.phases)
    }

    /// Multi-line summary broadcast when the run starts
    pub fn summary(&self) -> String {
        let phases: Vec<&str> = self.ordered_phases().iter().map(|p| p.as_str()).collect();
        let mut lines = vec![
            format!("run_id: {}", self.run_id),
            format!("target_url: {}", self.target_url),
            format!("phases: [{}]", phases.join(", ")),
            format!("force: {}", self.force),
            format!("headless: {}", self.headless),
            format!("target_page_count: {}", self.target_page_count),
        ];
        if !self.instructions.is_empty() {
            lines.push(format!("instructions: {}", self.instructions));
        }
        if let Some(hints) = &self.resume_hints {
            lines.push(format!(
                "resume: {} pages, last screenshot {}",
                hints.total_pages,
                hints.resume_from().unwrap_or_else(|| "none".to_string())
            ));
        }
        lines.join("\n")
    }
}

/// Status of a phase within a live run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Requested, not yet reached
    #[default]
    Pending,

    /// Executor in flight
    Running,

    /// Executor returned and artifacts were accepted
    Completed,

    /// Executor failed or artifacts were rejected
    Failed,

    /// Never reached because an earlier phase stopped the run
    Skipped,
}

/// Lifecycle of a live run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Phases are executing
    #[default]
    Running,

    /// Every requested phase completed
    Completed,

    /// A validation gate stopped the run
    Halted { phase: Phase },

    /// An executor failed
    Failed { phase: Phase, error: String },
}

/// Mutable state of one invocation, driven by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// The invocation's configuration
    pub config: RunConfig,

    /// Workspace the run writes into
    pub workspace: PathBuf,

    /// Current lifecycle state
    pub state: RunState,

    /// Status of each requested phase
    pub phase_statuses: BTreeMap<Phase, PhaseStatus>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run stopped (if it has)
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run with every requested phase pending
    pub fn new(config: RunConfig, workspace: PathBuf) -> Self {
        let phase_statuses = config
            .ordered_phases()
            .into_iter()
            .map(|phase| (phase, PhaseStatus::Pending))
            .collect();
        Self {
            config,
            workspace,
            state: RunState::Running,
            phase_statuses,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.config.run_id
    }

    /// Record a phase status change
    pub fn set_status(&mut self, phase: Phase, status: PhaseStatus) {
        self.phase_statuses.insert(phase, status);
    }

    /// Phases that completed in this run, in order
    pub fn completed_phases(&self) -> Vec<Phase> {
        self.phase_statuses
            .iter()
            .filter(|(_, status)| **status == PhaseStatus::Completed)
            .map(|(phase, _)| *phase)
            .collect()
    }

    /// Move to a terminal state; phases never reached are marked skipped
    pub fn finish(&mut self, state: RunState) {
        for status in self.phase_statuses.values_mut() {
            if *status == PhaseStatus::Pending {
                *status = PhaseStatus::Skipped;
            }
        }
        self.state = state;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }
}

/// How a phase attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// Executor returned; artifacts accepted (or accepted under force)
    Completed,

    /// Executor returned but required artifacts are missing
    ValidationFailed,

    /// Executor returned an error
    Failed,
}

/// Record of one attempted phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub outcome: PhaseOutcome,

    /// Validation performed after the executor returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,

    /// Executor error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Summary returned by the executor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Wall time of the executor call
    pub duration_ms: u64,
}

/// Overall result of a pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PipelineStatus {
    /// Every requested phase ran
    Completed,

    /// Outputs already existed; nothing ran
    Skipped { reason: String },

    /// A validation gate stopped the run
    Halted { phase: Phase, missing: Vec<String> },

    /// An executor failed
    Failed { phase: Phase, error: String },
}

/// What the caller of `run` receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub workspace: PathBuf,
    pub status: PipelineStatus,

    /// Attempted phases, in execution order
    pub phases: Vec<PhaseRecord>,
}

impl PipelineResult {
    /// Nothing ran because outputs already exist
    pub fn skipped(run_id: impl Into<String>, workspace: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            workspace,
            status: PipelineStatus::Skipped {
                reason: reason.into(),
            },
            phases: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, PipelineStatus::Completed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, PipelineStatus::Skipped { .. })
    }

    /// Record for a given phase, if it was attempted
    pub fn record(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }

    /// Phases whose outcome was `Completed`
    pub fn completed_phases(&self) -> Vec<Phase> {
        self.phases
            .iter()
            .filter(|r| r.outcome == PhaseOutcome::Completed)
            .map(|r| r.phase)
            .collect()
    }
}
