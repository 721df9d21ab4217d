//! Configuration for qaflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (QAFLOW_HOME, QAFLOW_WORKSPACES)
//! 2. Config file (.qaflow/config.yaml)
//! 3. Defaults (~/.qaflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .qaflow/config.yaml
//! - `paths.home` is relative to the .qaflow/ directory, every other path
//!   to the project root containing it

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::CommandSpec;
use crate::core::broadcast::DEFAULT_DELIVERY_TIMEOUT;
use crate::domain::{Phase, DEFAULT_TARGET_PAGE_COUNT};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default HTTP bind address
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Default allowed browser origin (the dashboard dev server)
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub broadcast: Option<BroadcastConfig>,
    #[serde(default)]
    pub defaults: Option<DefaultsConfig>,
    /// Phase name to executor program
    #[serde(default)]
    pub executors: HashMap<String, CommandSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .qaflow/)
    pub home: Option<String>,
    /// Run workspaces root (relative to the project root)
    pub workspaces: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    pub delivery_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    pub target_page_count: Option<u32>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to qaflow home (engine state)
    pub home: PathBuf,
    /// Root under which run workspaces are created
    pub workspaces: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// HTTP transport settings
    pub server: ServerSettings,
    /// Bound on one subscriber delivery
    pub delivery_timeout: Duration,
    /// Page target when a request does not give one
    pub target_page_count: u32,
    /// Configured executor per phase
    pub executors: BTreeMap<Phase, CommandSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".qaflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Parse the `executors` table, rejecting unknown phase names
fn parse_executors(raw: HashMap<String, CommandSpec>) -> Result<BTreeMap<Phase, CommandSpec>> {
    raw.into_iter()
        .map(|(name, spec)| {
            let phase = Phase::from_str(&name)
                .with_context(|| format!("Invalid executors entry '{}'", name))?;
            Ok((phase, spec))
        })
        .collect()
}

/// Combine defaults, an optional parsed config file and the environment
fn resolve_config(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let Some((config_path, config)) = file else {
        let home = env("QAFLOW_HOME").map(PathBuf::from).unwrap_or(default_home);
        let workspaces = env("QAFLOW_WORKSPACES")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("workspaces"));

        return Ok(ResolvedConfig {
            home,
            workspaces,
            config_file: None,
            server: ServerSettings::default(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            target_page_count: DEFAULT_TARGET_PAGE_COUNT,
            executors: BTreeMap::new(),
        });
    };

    // .qaflow/ and the project root containing it
    let qaflow_dir = config_path.parent().unwrap_or(Path::new("."));
    let base_dir = qaflow_dir.parent().unwrap_or(Path::new("."));

    let home = if let Some(env_home) = env("QAFLOW_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        resolve_path(qaflow_dir, home_path)
    } else {
        default_home
    };

    let workspaces = if let Some(env_ws) = env("QAFLOW_WORKSPACES") {
        PathBuf::from(env_ws)
    } else if let Some(ref ws_path) = config.paths.workspaces {
        resolve_path(base_dir, ws_path)
    } else {
        home.join("workspaces")
    };

    let mut server = ServerSettings::default();
    if let Some(section) = config.server {
        if let Some(bind) = section.bind {
            server.bind = bind;
        }
        if let Some(origins) = section.cors_origins {
            server.cors_origins = origins;
        }
    }

    let delivery_timeout = config
        .broadcast
        .and_then(|b| b.delivery_timeout_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_DELIVERY_TIMEOUT);

    let target_page_count = config
        .defaults
        .and_then(|d| d.target_page_count)
        .unwrap_or(DEFAULT_TARGET_PAGE_COUNT);

    let executors = parse_executors(config.executors)
        .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

    Ok(ResolvedConfig {
        home,
        workspaces,
        config_file: Some(config_path),
        server,
        delivery_timeout,
        target_page_count,
        executors,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".qaflow");

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve_config(default_home, file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
