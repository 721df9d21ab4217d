//! Per-run progress derived purely from artifact presence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::domain::Phase;

use super::validator::ArtifactValidator;
use super::workspace::{RunWorkspace, WorkspaceError};

/// Artifact presence for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseArtifactStatus {
    /// Every expected output exists
    pub completed: bool,

    /// Expected outputs that exist
    pub outputs: Vec<String>,

    /// Every expected output
    pub expected: Vec<String>,
}

/// Artifact-based status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub test_run_id: String,
    pub run_path: PathBuf,

    /// `"completed/total"`
    pub overall_progress: String,
    pub phases: BTreeMap<Phase, PhaseArtifactStatus>,
    pub is_complete: bool,
}

impl RunStatus {
    /// Inspect a run's workspace; `NotFound` if it does not exist
    pub async fn collect(
        workspace: &RunWorkspace,
        validator: &ArtifactValidator,
        run_id: &str,
    ) -> Result<Self, WorkspaceError> {
        let run_path = workspace.existing(run_id).await?;

        let mut phases = BTreeMap::new();
        for phase in Phase::ALL {
            let status = phase_status(validator, phase, &run_path).await;
            phases.insert(phase, status);
        }

        let completed = phases.values().filter(|p| p.completed).count();
        let total = phases.len();

        Ok(Self {
            test_run_id: run_id.to_string(),
            run_path,
            overall_progress: format!("{}/{}", completed, total),
            phases,
            is_complete: completed == total,
        })
    }
}

async fn phase_status(validator: &ArtifactValidator, phase: Phase, run_path: &Path) -> PhaseArtifactStatus {
    let Some(contract) = validator.contract(phase.as_str()) else {
        return PhaseArtifactStatus {
            completed: false,
            outputs: Vec::new(),
            expected: Vec::new(),
        };
    };

    let mut outputs = Vec::new();
    for file in &contract.files {
        if fs::metadata(run_path.join(file)).await.is_ok() {
            outputs.push(file.clone());
        }
    }
    for dir in &contract.directories {
        let is_dir = fs::metadata(run_path.join(dir))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            outputs.push(format!("{}/", dir));
        }
    }

    let expected = contract.outputs();
    PhaseArtifactStatus {
        completed: !expected.is_empty() && outputs.len() == expected.len(),
        outputs,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_counts_complete_phases() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());
        let path = workspace.ensure("run_s").await.unwrap();
        std::fs::write(path.join("discovery_summary.json"), "{}").unwrap();
        std::fs::write(path.join("site_map.json"), "{}").unwrap();
        std::fs::write(path.join("test_strategy.json"), "{}").unwrap();

        let status = RunStatus::collect(&workspace, &ArtifactValidator::new(), "run_s")
            .await
            .unwrap();

        assert_eq!(status.overall_progress, "1/4");
        assert!(!status.is_complete);
        assert!(status.phases[&Phase::Exploration].completed);

        let planning = &status.phases[&Phase::Planning];
        assert!(!planning.completed);
        assert_eq!(planning.outputs, vec!["test_strategy.json".to_string()]);

        // ensure() creates test_scripts/, which alone does not complete execution
        let execution = &status.phases[&Phase::Execution];
        assert_eq!(execution.outputs, vec!["test_scripts/".to_string()]);
        assert!(!execution.completed);
    }

    #[tokio::test]
    async fn test_status_unknown_run() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());
        let err = RunStatus::collect(&workspace, &ArtifactValidator::new(), "run_missing")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }
}
