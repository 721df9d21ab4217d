//! The fixed, ordered set of pipeline phases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One stage of the testing pipeline.
///
/// Variant order is the canonical execution order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Discovery and mapping of the target application
    Exploration,

    /// Test strategy and scenario design
    Planning,

    /// Script generation and test execution
    Execution,

    /// Analysis and stakeholder reporting
    Reporting,
}

impl Phase {
    /// All phases in canonical order
    pub const ALL: [Phase; 4] = [
        Phase::Exploration,
        Phase::Planning,
        Phase::Execution,
        Phase::Reporting,
    ];

    /// Wire name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Exploration => "exploration",
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Reporting => "reporting",
        }
    }

    /// Human-readable title
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Exploration => "Application Exploration",
            Phase::Planning => "Test Planning",
            Phase::Execution => "Test Execution",
            Phase::Reporting => "Reporting & Analysis",
        }
    }

    /// One-line description of the work the phase performs
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Exploration => {
                "Discovery and mapping of application structure, navigation, and functionality"
            }
            Phase::Planning => {
                "Strategic test planning and scenario design based on discovery results"
            }
            Phase::Execution => "Automated test script generation and execution with monitoring",
            Phase::Reporting => "Comprehensive reporting and stakeholder communication",
        }
    }

    /// 1-based position in the pipeline
    pub fn number(&self) -> usize {
        match self {
            Phase::Exploration => 1,
            Phase::Planning => 2,
            Phase::Execution => 3,
            Phase::Reporting => 4,
        }
    }

    /// Intersect a requested set with the canonical order.
    ///
    /// Duplicates collapse and the caller's ordering is ignored.
    pub fn in_canonical_order(requested: &[Phase]) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|phase| requested.contains(phase))
            .collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known phase name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let requested = vec![Phase::Reporting, Phase::Exploration, Phase::Reporting];
        assert_eq!(
            Phase::in_canonical_order(&requested),
            vec![Phase::Exploration, Phase::Reporting]
        );
        assert!(Phase::Exploration < Phase::Planning);
        assert!(Phase::Execution < Phase::Reporting);
    }

    #[test]
    fn test_parse_phase_names() {
        assert_eq!("planning".parse::<Phase>(), Ok(Phase::Planning));
        assert_eq!(
            "Planning".parse::<Phase>(),
            Err(UnknownPhase("Planning".to_string()))
        );
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::Execution).unwrap();
        assert_eq!(json, "\"execution\"");
    }
}
