//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Refuse `link()` calls that would close a cycle. Default: true.
    pub reject_cycles: bool,
    /// Maximum hydration recursion depth. Default: 256.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            reject_cycles: true,
            max_depth: 256,
        }
    }
}
