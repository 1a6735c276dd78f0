//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Graph rewrites the optimizer knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationPass {
    /// Project source reads down to the columns consumed downstream.
    Columns,
    /// Fuse linear chains of blockwise layers.
    LayerChains,
}

impl std::str::FromStr for OptimizationPass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "columns" => Ok(OptimizationPass::Columns),
            "layer-chains" => Ok(OptimizationPass::LayerChains),
            other => Err(Error::Config(format!("unknown optimization pass '{other}'"))),
        }
    }
}

/// What to do when an optimization pass fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFail {
    /// Log a warning and keep the unrewritten graph.
    #[default]
    Warn,
    /// Keep the unrewritten graph silently.
    Pass,
    /// Propagate the error to the caller.
    Raise,
}

impl std::str::FromStr for OnFail {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "warn" => Ok(OnFail::Warn),
            "pass" => Ok(OnFail::Pass),
            "raise" => Ok(OnFail::Raise),
            other => Err(Error::Config(format!("unknown on_fail policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Master switch; when off only culling runs.
    pub enabled: bool,

    /// Passes in the order they run.
    pub passes: Vec<OptimizationPass>,

    pub on_fail: OnFail,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            passes: vec![OptimizationPass::Columns, OptimizationPass::LayerChains],
            on_fail: OnFail::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Execution parallelism. The scheduler must respect this when launching tasks.
    pub max_parallel_tasks: usize,

    /// Fan-in of the reduction tree: at most this many partials per combine.
    pub split_every: usize,

    pub optimization: OptimizationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            split_every: 8,
            optimization: OptimizationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `JAGGED_MAX_PARALLEL_TASKS`: max parallel tasks
    /// - `JAGGED_SPLIT_EVERY`: reduction tree fan-in
    /// - `JAGGED_OPTIMIZATION_ENABLED`: `true`/`false`
    /// - `JAGGED_OPTIMIZATION_PASSES`: comma-separated pass names
    /// - `JAGGED_OPTIMIZATION_ON_FAIL`: `warn`, `pass` or `raise`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("JAGGED_MAX_PARALLEL_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_tasks = v;
            }
        }

        if let Ok(s) = std::env::var("JAGGED_SPLIT_EVERY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.split_every = v;
            }
        }

        if let Ok(s) = std::env::var("JAGGED_OPTIMIZATION_ENABLED") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.optimization.enabled = v;
            }
        }

        if let Ok(s) = std::env::var("JAGGED_OPTIMIZATION_PASSES") {
            let parsed: Result<Vec<OptimizationPass>> = s
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(str::parse)
                .collect();
            if let Ok(passes) = parsed {
                cfg.optimization.passes = passes;
            }
        }

        if let Ok(s) = std::env::var("JAGGED_OPTIMIZATION_ON_FAIL") {
            if let Ok(v) = s.parse::<OnFail>() {
                cfg.optimization.on_fail = v;
            }
        }

        cfg
    }

    /// Parse a YAML document; omitted keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_tasks == 0 {
            return Err(Error::Config("max_parallel_tasks must be at least 1".into()));
        }
        if self.split_every < 2 {
            return Err(Error::Config(format!(
                "split_every must be at least 2, got {}",
                self.split_every
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_only_given_keys() {
        let cfg = EngineConfig::from_yaml_str(
            "split_every: 3\noptimization:\n  passes: [columns]\n  on_fail: raise\n",
        )
        .unwrap();
        assert_eq!(cfg.split_every, 3);
        assert_eq!(cfg.max_parallel_tasks, 4);
        assert!(cfg.optimization.enabled);
        assert_eq!(cfg.optimization.passes, vec![OptimizationPass::Columns]);
        assert_eq!(cfg.optimization.on_fail, OnFail::Raise);
    }

    #[test]
    fn tiny_split_every_is_rejected() {
        let err = EngineConfig::from_yaml_str("split_every: 1\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
