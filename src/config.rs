//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a single engine instance.
///
/// The loop iteration cap is deliberately not here: it is a hard constant
/// ([`crate::definition::LOOP_ITERATION_CAP`]) that no configuration may
/// raise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on node dispatches per `execute`/`resume` call.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Fallback per-branch timeout for parallel nodes that do not set one.
    #[serde(default)]
    pub default_branch_timeout_ms: Option<u64>,
}

fn default_max_steps() -> u32 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: default_max_steps(),
            default_branch_timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps, 500);
        assert!(config.default_branch_timeout_ms.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str("{\"max_steps\": 50}").unwrap();
        assert_eq!(config.max_steps, 50);
    }
}
