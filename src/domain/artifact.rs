//! Artifact contracts and the derived records computed from a run workspace.
//!
//! Phases communicate only through files in the workspace. A contract lists
//! what a phase must leave behind for the next one to start.

use serde::{Deserialize, Serialize};

use super::phase::Phase;

/// Files and directories a phase must produce, relative to the workspace root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactContract {
    /// Required regular files
    pub files: Vec<String>,

    /// Required directories
    #[serde(default)]
    pub directories: Vec<String>,
}

impl ArtifactContract {
    /// Build a contract from static name lists
    pub fn new(files: &[&str], directories: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            directories: directories.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// The built-in contract for a phase
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Exploration => Self::new(&["discovery_summary.json", "site_map.json"], &[]),
            Phase::Planning => Self::new(&["test_strategy.json", "test_scenarios.json"], &[]),
            Phase::Execution => Self::new(
                &["test_results.json", "execution_log.txt"],
                &["test_scripts"],
            ),
            Phase::Reporting => Self::new(&["final_report.json", "executive_summary.txt"], &[]),
        }
    }

    /// Every expected output, directories rendered with a trailing slash
    pub fn outputs(&self) -> Vec<String> {
        self.files
            .iter()
            .cloned()
            .chain(self.directories.iter().map(|d| format!("{}/", d)))
            .collect()
    }
}

/// Outcome of checking one phase's artifacts against its contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Phase name the check was made for
    pub phase: String,

    /// Whether the pipeline may proceed
    pub passed: bool,

    /// Required paths that were not found
    pub missing: Vec<String>,

    /// Set when the check itself could not complete and passed leniently
    #[serde(default)]
    pub degraded: bool,

    /// Why the result is not a plain pass or fail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    /// Every required path exists
    pub fn pass(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            passed: true,
            missing: Vec::new(),
            degraded: false,
            reason: None,
        }
    }

    /// Some required paths are missing
    pub fn fail(phase: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            phase: phase.into(),
            passed: false,
            missing,
            degraded: false,
            reason: None,
        }
    }

    /// The check could not complete; pass anyway and say why
    pub fn degraded(phase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            passed: true,
            missing: Vec::new(),
            degraded: true,
            reason: Some(reason.into()),
        }
    }

    /// Attach an explanatory note
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Resume hints derived from the artifacts of an interrupted run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// Pages already recorded in the discovery summary
    pub total_pages: usize,

    /// Highest screenshot index seen (`p<N>.<ext>`)
    pub last_index: Option<u32>,
}

impl CheckpointInfo {
    /// Nothing captured yet
    pub fn is_empty(&self) -> bool {
        self.total_pages == 0 && self.last_index.is_none()
    }

    /// Name of the last captured screenshot, if any
    pub fn resume_from(&self) -> Option<String> {
        self.last_index.map(|n| format!("p{}.png", n))
    }
}
