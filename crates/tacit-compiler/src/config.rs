//! Optimizer configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for the optimizer.
///
/// Missing fields fall back to their defaults when deserializing, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Splice calls at all. When off every call site is kept.
    pub inlining: bool,
    /// Largest callee size (in instructions) the planner will splice.
    pub inlining_size_budget: usize,
    /// How many levels of calls exposed by splicing may themselves be inlined.
    pub max_inlining_depth: usize,
    /// Re-analyze every fusion replacement against the window it replaces.
    pub verify_fusion: bool,
    /// Compile independent functions of a level on the rayon pool.
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            inlining: true,
            inlining_size_budget: 24,
            max_inlining_depth: 4,
            verify_fusion: cfg!(debug_assertions),
            parallel: true,
        }
    }
}

/// Failure to load an [`OptimizerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl OptimizerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Configuration that keeps every call.
    pub fn no_inlining() -> Self {
        Self {
            inlining: false,
            ..Self::default()
        }
    }
}
