//! Domain types for the qaflow orchestrator.
//!
//! This module contains the core data structures:
//! - Phase: The fixed four-stage pipeline
//! - Artifact: Contracts, validation results and resume hints
//! - Events: Progress messages streamed to observers
//! - Run: Configuration, live state and results
//! - Request: Incoming run requests

pub mod artifact;
pub mod events;
pub mod phase;
pub mod request;
pub mod run;

// Re-export commonly used types
pub use artifact::{ArtifactContract, CheckpointInfo, ValidationResult};
pub use events::{EventKind, LogEvent};
pub use phase::{Phase, UnknownPhase};
pub use request::{RequestError, RunRequest};
pub use run::{
    generate_run_id, PhaseOutcome, PhaseRecord, PhaseStatus, PipelineResult, PipelineRun,
    PipelineStatus, RunConfig, RunState, DEFAULT_TARGET_PAGE_COUNT,
};
