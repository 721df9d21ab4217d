//! qaflow - Multi-phase web application testing pipeline
//!
//! Drives an LLM-agent testing workflow through four phases (exploration,
//! planning, execution, reporting). Phases hand work to each other only
//! through files in a per-run workspace; each phase's outputs are checked
//! against its artifact contract before the next one starts.
//!
//! # Architecture
//!
//! - Phase executors are pluggable; the orchestrator never sees how a phase
//!   does its work
//! - Progress is broadcast as live events to any number of subscribers
//! - Interrupted runs are resumed from hints derived from their artifacts
//!
//! # Modules
//!
//! - `adapters`: Phase executor interface and implementations
//! - `core`: Orchestration logic (Workspace, Validator, Checkpoint, Hub)
//! - `domain`: Data structures (Phase, RunConfig, LogEvent, PipelineResult)
//! - `server`: HTTP and WebSocket transport
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Explore and plan an application
//! qaflow run https://example.com --phases exploration,planning
//!
//! # Check run progress
//! qaflow status <run-id>
//!
//! # Resume an interrupted run
//! qaflow resume <run-id> https://example.com
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;

// Re-export main types at crate root for convenience
pub use adapters::{PhaseExecutor, PhaseInputs, PhaseLog, PhaseOutput};
pub use core::{ArtifactValidator, BroadcastHub, CheckpointResolver, Orchestrator, RunWorkspace};
pub use domain::{LogEvent, Phase, PipelineResult, PipelineStatus, RunConfig, RunRequest};
