//! Artifact validation gate between phases.
//!
//! Validation must never stop a pipeline because of its own trouble: an
//! unknown phase passes, and a filesystem error while checking passes with
//! `degraded` set. Only a confirmed missing artifact fails.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::domain::{ArtifactContract, Phase, ValidationResult};

/// Presence of one required path
enum Presence {
    Present,
    Missing,
    Unknown(std::io::Error),
}

/// Checks phase outputs against a table of artifact contracts
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    contracts: BTreeMap<String, ArtifactContract>,
}

impl Default for ArtifactValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactValidator {
    /// Validator with the built-in contract for every phase
    pub fn new() -> Self {
        let contracts = Phase::ALL
            .into_iter()
            .map(|phase| (phase.as_str().to_string(), ArtifactContract::for_phase(phase)))
            .collect();
        Self { contracts }
    }

    /// Contract registered for a phase name
    pub fn contract(&self, phase: &str) -> Option<&ArtifactContract> {
        self.contracts.get(phase)
    }

    /// Check that every artifact required for `phase` exists in `workspace`
    pub async fn validate(&self, phase: &str, workspace: &Path) -> ValidationResult {
        let Some(contract) = self.contracts.get(phase) else {
            warn!(phase, "No validation rules for phase, allowing it to continue");
            return ValidationResult::pass(phase).with_reason("no contract for phase");
        };

        let mut missing = Vec::new();

        for file in &contract.files {
            match check_path(&workspace.join(file), false).await {
                Presence::Present => {}
                Presence::Missing => missing.push(file.clone()),
                Presence::Unknown(e) => return degraded(phase, file, e),
            }
        }

        for dir in &contract.directories {
            match check_path(&workspace.join(dir), true).await {
                Presence::Present => {}
                Presence::Missing => missing.push(format!("{}/", dir)),
                Presence::Unknown(e) => return degraded(phase, dir, e),
            }
        }

        if missing.is_empty() {
            debug!(phase, "Phase validation passed");
            ValidationResult::pass(phase)
        } else {
            warn!(phase, missing = %missing.join(", "), "Phase validation failed");
            ValidationResult::fail(phase, missing)
        }
    }

    /// Whether every listed phase already satisfies its contract.
    ///
    /// Only a confirmed pass counts; a degraded pass means the outputs
    /// could not be checked, so the work is not known to exist.
    pub async fn is_satisfied(&self, phases: &[Phase], workspace: &Path) -> bool {
        for phase in phases {
            let result = self.validate(phase.as_str(), workspace).await;
            if !result.passed || result.degraded {
                return false;
            }
        }
        true
    }
}

async fn check_path(path: &Path, want_dir: bool) -> Presence {
    match fs::metadata(path).await {
        Ok(meta) if want_dir && !meta.is_dir() => Presence::Missing,
        Ok(_) => Presence::Present,
        Err(e) if e.kind() == ErrorKind::NotFound => Presence::Missing,
        Err(e) => Presence::Unknown(e),
    }
}

fn degraded(phase: &str, path: &str, error: std::io::Error) -> ValidationResult {
    warn!(phase, path, error = %error, "Phase validation error, not blocking pipeline");
    ValidationResult::degraded(phase, format!("could not check {}: {}", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "{}").unwrap();
    }

    #[tokio::test]
    async fn test_exploration_passes_with_both_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "discovery_summary.json");
        touch(temp.path(), "site_map.json");

        let result = ArtifactValidator::new()
            .validate("exploration", temp.path())
            .await;
        assert!(result.passed);
        assert!(!result.degraded);
        assert!(result.missing.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "discovery_summary.json");

        let result = ArtifactValidator::new()
            .validate("exploration", temp.path())
            .await;
        assert!(!result.passed);
        assert_eq!(result.missing, vec!["site_map.json".to_string()]);
    }

    #[tokio::test]
    async fn test_execution_requires_scripts_directory() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "test_results.json");
        touch(temp.path(), "execution_log.txt");
        // A file with the directory's name does not count
        touch(temp.path(), "test_scripts");

        let validator = ArtifactValidator::new();
        let result = validator.validate("execution", temp.path()).await;
        assert_eq!(result.missing, vec!["test_scripts/".to_string()]);

        std::fs::remove_file(temp.path().join("test_scripts")).unwrap();
        std::fs::create_dir(temp.path().join("test_scripts")).unwrap();
        assert!(validator.validate("execution", temp.path()).await.passed);
    }

    #[tokio::test]
    async fn test_unknown_phase_passes() {
        let temp = TempDir::new().unwrap();
        let result = ArtifactValidator::new().validate("smoke", temp.path()).await;
        assert!(result.passed);
        assert!(!result.degraded);
        assert!(result.reason.is_some());
    }

    #[tokio::test]
    async fn test_io_error_is_degraded_pass() {
        let temp = TempDir::new().unwrap();
        // Workspace path is a regular file, so every lookup beneath it
        // fails with something other than NotFound.
        let not_a_dir = temp.path().join("workspace");
        std::fs::write(&not_a_dir, "").unwrap();

        let result = ArtifactValidator::new()
            .validate("planning", &not_a_dir)
            .await;
        assert!(result.passed);
        assert!(result.degraded);
        assert!(result.reason.unwrap().contains("test_strategy.json"));
    }

    #[tokio::test]
    async fn test_is_satisfied_requires_every_phase() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "discovery_summary.json");
        touch(temp.path(), "site_map.json");

        let validator = ArtifactValidator::new();
        assert!(
            validator
                .is_satisfied(&[Phase::Exploration], temp.path())
                .await
        );
        assert!(
            !validator
                .is_satisfied(&[Phase::Exploration, Phase::Planning], temp.path())
                .await
        );
    }

    #[tokio::test]
    async fn test_degraded_pass_is_not_satisfied() {
        let temp = TempDir::new().unwrap();
        let not_a_dir = temp.path().join("run_broken");
        std::fs::write(&not_a_dir, "").unwrap();

        let validator = ArtifactValidator::new();
        assert!(validator.validate("exploration", &not_a_dir).await.degraded);
        assert!(
            !validator
                .is_satisfied(&[Phase::Exploration], &not_a_dir)
                .await
        );
    }
}
