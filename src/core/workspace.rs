//! Deterministic per-run directory layout.
//!
//! A run's workspace is `<root>/<run_id>` with a fixed set of
//! subdirectories. The path depends on the run id alone, so any process
//! configured with the same root finds the same workspace.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Subdirectories created inside every workspace
pub const WORKSPACE_SUBDIRS: [&str; 4] = ["logs", "screenshots", "evidence", "test_scripts"];

/// Errors that can occur while preparing or reading a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error("Test run {0} not found")]
    NotFound(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("File {filename} not found in run {run_id}")]
    ArtifactNotFound { run_id: String, filename: String },

    #[error("Workspace I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Resolves and creates run workspaces under a root directory
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
}

impl RunWorkspace {
    /// Workspaces live directly under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding every run
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical workspace path for a run id
    pub fn path_for(&self, run_id: &str) -> Result<PathBuf, WorkspaceError> {
        validate_run_id(run_id)?;
        Ok(self.root.join(run_id))
    }

    /// Create the workspace tree if needed and return its path.
    ///
    /// Safe to call repeatedly; existing directories are left untouched.
    pub async fn ensure(&self, run_id: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.path_for(run_id)?;

        for subdir in WORKSPACE_SUBDIRS {
            let dir = path.join(subdir);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| WorkspaceError::io(&dir, e))?;
        }

        debug!(run_id, path = %path.display(), "Workspace ready");
        Ok(path)
    }

    /// Whether a workspace directory exists for the run
    pub async fn exists(&self, run_id: &str) -> Result<bool, WorkspaceError> {
        let path = self.path_for(run_id)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WorkspaceError::io(&path, e)),
        }
    }

    /// Path of an existing workspace, or `NotFound`
    pub async fn existing(&self, run_id: &str) -> Result<PathBuf, WorkspaceError> {
        if !self.exists(run_id).await? {
            return Err(WorkspaceError::NotFound(run_id.to_string()));
        }
        self.path_for(run_id)
    }

    /// Run directories under the root, newest first.
    ///
    /// Only directories named `run*` are listed; generated ids sort
    /// chronologically, so a reverse sort puts the latest run first.
    pub async fn list_runs(&self) -> Result<Vec<String>, WorkspaceError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(&self.root, e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("run") {
                    runs.push(name.to_string());
                }
            }
        }

        runs.sort_unstable_by(|a, b| b.cmp(a));
        Ok(runs)
    }

    /// Regular files at the top level of a run's workspace, sorted by name
    pub async fn list_files(&self, run_id: &str) -> Result<Vec<String>, WorkspaceError> {
        let path = self.existing(run_id).await?;
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Path of a regular file at the top level of a run's workspace
    pub async fn artifact_path(&self, run_id: &str, filename: &str) -> Result<PathBuf, WorkspaceError> {
        validate_file_name(filename)?;
        let path = self.existing(run_id).await?.join(filename);

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(WorkspaceError::ArtifactNotFound {
                run_id: run_id.to_string(),
                filename: filename.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WorkspaceError::ArtifactNotFound {
                    run_id: run_id.to_string(),
                    filename: filename.to_string(),
                })
            }
            Err(e) => Err(WorkspaceError::io(&path, e)),
        }
    }
}

/// Only bare names inside the workspace are served
fn validate_file_name(filename: &str) -> Result<(), WorkspaceError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');

    if invalid {
        return Err(WorkspaceError::InvalidFileName(filename.to_string()));
    }
    Ok(())
}

/// Reject ids that would escape the workspace root
fn validate_run_id(run_id: &str) -> Result<(), WorkspaceError> {
    let invalid = run_id.is_empty()
        || run_id == "."
        || run_id.contains("..")
        || run_id.contains('/')
        || run_id.contains('\\')
        || run_id.contains('\0');

    if invalid {
        return Err(WorkspaceError::InvalidRunId(run_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_is_pure_function_of_run_id() {
        let workspace = RunWorkspace::new("/srv/qaflow/runs");
        let a = workspace.path_for("run_20250101_000000").unwrap();
        let b = workspace.path_for("run_20250101_000000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/srv/qaflow/runs/run_20250101_000000"));
    }

    #[test]
    fn test_rejects_traversal() {
        let workspace = RunWorkspace::new("/srv/qaflow/runs");
        for bad in ["", ".", "..", "../etc", "a/b", "run\\x"] {
            assert!(
                matches!(workspace.path_for(bad), Err(WorkspaceError::InvalidRunId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_ensure_creates_layout() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());

        let path = workspace.ensure("run_a").await.unwrap();
        for subdir in WORKSPACE_SUBDIRS {
            assert!(path.join(subdir).is_dir(), "{subdir} missing");
        }
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());

        let first = workspace.ensure("run_a").await.unwrap();
        std::fs::write(first.join("logs").join("keep.txt"), "x").unwrap();

        let second = workspace.ensure("run_a").await.unwrap();
        assert_eq!(first, second);
        assert!(second.join("logs").join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_ensure_reports_io_error() {
        let temp = TempDir::new().unwrap();
        // A file where the root directory should be
        let blocker = temp.path().join("runs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let workspace = RunWorkspace::new(&blocker);
        let err = workspace.ensure("run_a").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());

        workspace.ensure("run_20250101_000000").await.unwrap();
        workspace.ensure("run_20250301_000000").await.unwrap();
        workspace.ensure("scratch").await.unwrap();
        std::fs::write(temp.path().join("run_notes.txt"), "").unwrap();

        let runs = workspace.list_runs().await.unwrap();
        assert_eq!(runs, vec!["run_20250301_000000", "run_20250101_000000"]);
    }

    #[tokio::test]
    async fn test_list_runs_missing_root() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path().join("absent"));
        assert!(workspace.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_files_and_not_found() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());

        let path = workspace.ensure("run_a").await.unwrap();
        std::fs::write(path.join("site_map.json"), "{}").unwrap();
        std::fs::write(path.join("discovery_summary.json"), "{}").unwrap();

        let files = workspace.list_files("run_a").await.unwrap();
        assert_eq!(files, vec!["discovery_summary.json", "site_map.json"]);

        let err = workspace.list_files("run_b").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_artifact_path() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());

        let path = workspace.ensure("run_a").await.unwrap();
        std::fs::write(path.join("site_map.json"), "{}").unwrap();

        let found = workspace.artifact_path("run_a", "site_map.json").await.unwrap();
        assert_eq!(found, path.join("site_map.json"));

        // Directories are not artifacts
        let err = workspace.artifact_path("run_a", "logs").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::ArtifactNotFound { .. }));

        let err = workspace.artifact_path("run_a", "absent.json").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::ArtifactNotFound { .. }));

        let err = workspace.artifact_path("run_b", "site_map.json").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_artifact_path_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let workspace = RunWorkspace::new(temp.path());
        workspace.ensure("run_a").await.unwrap();

        for bad in ["", ".", "..", "../secret", "logs/events.jsonl", "a\\b"] {
            let err = workspace.artifact_path("run_a", bad).await.unwrap_err();
            assert!(
                matches!(err, WorkspaceError::InvalidFileName(_)),
                "{bad:?} should be rejected"
            );
        }
    }
}
