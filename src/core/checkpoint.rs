//! Resume hints recomputed from an interrupted run's artifacts.
//!
//! Nothing is persisted for checkpoints; the discovery summary itself is the
//! record. Resolution never fails: any problem degrades to an empty
//! checkpoint with a warning.

use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::CheckpointInfo;

/// File written by the exploration phase
pub const DISCOVERY_SUMMARY: &str = "discovery_summary.json";

/// The parts of the discovery summary the resolver reads
#[derive(Debug, Default, Deserialize)]
struct DiscoverySummary {
    #[serde(default)]
    pages_discovered: Vec<DiscoveredPage>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscoveredPage {
    #[serde(default)]
    screenshot_path: Option<String>,
}

/// Derives `CheckpointInfo` from a workspace
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointResolver;

impl CheckpointResolver {
    pub fn new() -> Self {
        Self
    }

    /// Inspect the discovery summary in `workspace`
    pub async fn resolve(&self, workspace: &Path) -> CheckpointInfo {
        let path = workspace.join(DISCOVERY_SUMMARY);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "No discovery summary, starting from scratch");
                return CheckpointInfo::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read discovery summary");
                return CheckpointInfo::default();
            }
        };

        if content.trim().is_empty() {
            warn!(path = %path.display(), "Discovery summary is empty");
            return CheckpointInfo::default();
        }

        match serde_json::from_str::<DiscoverySummary>(&content) {
            Ok(summary) => {
                let info = summarize(&summary);
                debug!(
                    total_pages = info.total_pages,
                    last_index = ?info.last_index,
                    "Resolved checkpoint"
                );
                info
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not parse existing discovery summary"
                );
                CheckpointInfo::default()
            }
        }
    }
}

fn summarize(summary: &DiscoverySummary) -> CheckpointInfo {
    let max_index = summary
        .pages_discovered
        .iter()
        .filter_map(|page| page.screenshot_path.as_deref())
        .filter_map(screenshot_index)
        .max()
        .unwrap_or(0);

    CheckpointInfo {
        total_pages: summary.pages_discovered.len(),
        last_index: (max_index > 0).then_some(max_index),
    }
}

/// Index embedded in a `p<N>.<ext>` screenshot name.
///
/// Directory prefixes are ignored; names that do not follow the convention
/// yield `None`.
pub fn screenshot_index(path: &str) -> Option<u32> {
    let name = path.rsplit(['/', '\\']).next()?;
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    let digits = stem.strip_prefix('p')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_index_parsing() {
        assert_eq!(screenshot_index("p12.png"), Some(12));
        assert_eq!(screenshot_index("screenshots/p7.jpeg"), Some(7));
        assert_eq!(screenshot_index("p3"), Some(3));
        assert_eq!(screenshot_index("page12.png"), None);
        assert_eq!(screenshot_index("p.png"), None);
        assert_eq!(screenshot_index("p-1.png"), None);
        assert_eq!(screenshot_index("home.png"), None);
    }

    #[test]
    fn test_summarize_ignores_unconventional_names() {
        let summary: DiscoverySummary = serde_json::from_str(
            r#"{"pages_discovered": [
                {"screenshot_path": "p2.png"},
                {"screenshot_path": "login.png"},
                {"url": "https://example.com/about"}
            ]}"#,
        )
        .unwrap();

        let info = summarize(&summary);
        assert_eq!(info.total_pages, 3);
        assert_eq!(info.last_index, Some(2));
    }

    #[test]
    fn test_summarize_zero_index_is_none() {
        let summary: DiscoverySummary =
            serde_json::from_str(r#"{"pages_discovered": [{"screenshot_path": "p0.png"}]}"#)
                .unwrap();
        let info = summarize(&summary);
        assert_eq!(info.total_pages, 1);
        assert_eq!(info.last_index, None);
    }
}
