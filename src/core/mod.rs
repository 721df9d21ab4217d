//! Core orchestration logic.
//!
//! This module contains:
//! - RunWorkspace: Per-run directory management
//! - ArtifactValidator: Phase output contracts
//! - CheckpointResolver: Resume hints from partial runs
//! - BroadcastHub: Live event fan-out
//! - RunStatus: Artifact-derived progress
//! - Orchestrator: Main execution engine

pub mod broadcast;
pub mod checkpoint;
pub mod orchestrator;
pub mod status;
pub mod validator;
pub mod workspace;

// Re-export commonly used types
pub use broadcast::{BroadcastHub, ChannelSubscriber, DeliveryError, Subscriber, SubscriberId};
pub use checkpoint::{screenshot_index, CheckpointResolver};
pub use orchestrator::Orchestrator;
pub use status::{PhaseArtifactStatus, RunStatus};
pub use validator::ArtifactValidator;
pub use workspace::{RunWorkspace, WorkspaceError};
