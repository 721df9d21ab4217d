//! Run requests as they arrive from the outside world.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::phase::Phase;
use super::run::{generate_run_id, RunConfig, DEFAULT_TARGET_PAGE_COUNT};

/// Reasons a run request is rejected before any workspace is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("base_url is required")]
    MissingBaseUrl,

    #[error("Invalid phases: {invalid:?}. Valid phases are: {valid:?}")]
    InvalidPhases {
        invalid: Vec<String>,
        valid: Vec<&'static str>,
    },

    #[error("At least one phase must be requested")]
    NoPhases,

    #[error("test_run_id is required for resume operation")]
    MissingRunId,
}

/// A structured request to execute (or resume) a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Application under test
    pub base_url: String,

    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub headless: bool,

    /// Existing or desired run id; generated when empty
    #[serde(default)]
    pub test_run_id: Option<String>,

    /// Phase names to execute
    #[serde(default = "default_phases")]
    pub phases: Vec<String>,

    #[serde(default = "default_target_page_count")]
    pub target_page_count: u32,
}

fn default_phases() -> Vec<String> {
    vec![Phase::Exploration.as_str().to_string()]
}

fn default_target_page_count() -> u32 {
    DEFAULT_TARGET_PAGE_COUNT
}

impl RunRequest {
    /// Request with defaults for everything except the target
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            instructions: String::new(),
            force: false,
            headless: false,
            test_run_id: None,
            phases: default_phases(),
            target_page_count: default_target_page_count(),
        }
    }

    /// Supplied run id, ignoring blank values
    pub fn run_id(&self) -> Option<&str> {
        self.test_run_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Parse phase names, reporting every unknown one at once
    pub fn parse_phases(&self) -> Result<Vec<Phase>, RequestError> {
        let mut phases = Vec::with_capacity(self.phases.len());
        let mut invalid = Vec::new();

        for name in &self.phases {
            match name.parse::<Phase>() {
                Ok(phase) => phases.push(phase),
                Err(_) => invalid.push(name.clone()),
            }
        }

        if !invalid.is_empty() {
            return Err(RequestError::InvalidPhases {
                invalid,
                valid: Phase::ALL.iter().map(|p| p.as_str()).collect(),
            });
        }
        if phases.is_empty() {
            return Err(RequestError::NoPhases);
        }

        Ok(phases)
    }

    /// Validate and convert into an immutable run configuration
    pub fn into_config(self) -> Result<RunConfig, RequestError> {
        if self.base_url.trim().is_empty() {
            return Err(RequestError::MissingBaseUrl);
        }
        let phases = self.parse_phases()?;
        let run_id = self
            .run_id()
            .map(str::to_string)
            .unwrap_or_else(generate_run_id);

        Ok(RunConfig::new(self.base_url.trim())
            .with_run_id(run_id)
            .with_instructions(self.instructions)
            .with_phases(phases)
            .with_force(self.force)
            .with_headless(self.headless)
            .with_target_page_count(self.target_page_count))
    }

    /// Like `into_config`, but an explicit run id is mandatory
    pub fn into_resume_config(self) -> Result<RunConfig, RequestError> {
        if self.run_id().is_none() {
            return Err(RequestError::MissingRunId);
        }
        self.into_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let request: RunRequest =
            serde_json::from_str(r#"{"base_url": "https://example.com"}"#).unwrap();

        assert_eq!(request.phases, vec!["exploration".to_string()]);
        assert_eq!(request.target_page_count, 100);
        assert!(!request.force);

        let config = request.into_config().unwrap();
        assert!(config.run_id.starts_with("run_"));
        assert_eq!(config.phases, vec![Phase::Exploration]);
    }

    #[test]
    fn test_invalid_phases_rejected() {
        let mut request = RunRequest::new("https://example.com");
        request.phases = vec!["exploration".into(), "deploy".into(), "lint".into()];

        match request.into_config() {
            Err(RequestError::InvalidPhases { invalid, valid }) => {
                assert_eq!(invalid, vec!["deploy".to_string(), "lint".to_string()]);
                assert_eq!(valid.len(), 4);
            }
            other => panic!("expected InvalidPhases, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_base_url_rejected() {
        let request = RunRequest::new("   ");
        assert_eq!(request.into_config(), Err(RequestError::MissingBaseUrl));
    }

    #[test]
    fn test_blank_run_id_is_generated() {
        let mut request = RunRequest::new("https://example.com");
        request.test_run_id = Some("  ".to_string());
        assert!(request.run_id().is_none());

        let mut resume = RunRequest::new("https://example.com");
        resume.test_run_id = Some(String::new());
        assert_eq!(resume.into_resume_config(), Err(RequestError::MissingRunId));
    }

    #[test]
    fn test_explicit_run_id_kept() {
        let mut request = RunRequest::new("https://example.com");
        request.test_run_id = Some("run_20250820_ecommerce".to_string());
        request.phases = vec!["planning".into(), "exploration".into()];

        let config = request.into_config().unwrap();
        assert_eq!(config.run_id, "run_20250820_ecommerce");
        assert_eq!(
            config.ordered_phases(),
            vec![Phase::Exploration, Phase::Planning]
        );
    }
}
