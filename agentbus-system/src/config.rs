//! Configuration for a [`crate::MultiAgentSystem`] session.

use serde::Deserialize;

fn default_pattern() -> String {
    "debate".to_string()
}

fn default_max_rounds() -> usize {
    3
}

fn default_consensus_threshold() -> f64 {
    0.5
}

fn default_timeout_secs() -> u64 {
    60
}

/// Mirrors `PatternConfig` plus the pattern selector and the overall session
/// timeout, as a flat `serde`-deserializable document (`pattern`,
/// `max_rounds`, `consensus_threshold`, `timeout`, `enable_voting` — matching
/// the configuration surface section of the design this crate implements).
///
/// `pattern` is a loose string rather than the typed `CoordinationPattern`
/// enum: an unrecognised value should degrade to debate at startup rather
/// than fail deserialization, and [`agentbus_coordinators::CoordinationPattern::parse_or_default`]
/// is where that degradation happens, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiAgentSystemConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,

    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub enable_voting: bool,
}

impl Default for MultiAgentSystemConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            max_rounds: default_max_rounds(),
            consensus_threshold: default_consensus_threshold(),
            timeout_secs: default_timeout_secs(),
            enable_voting: false,
        }
    }
}

impl MultiAgentSystemConfig {
    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
