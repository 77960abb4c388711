//! Engine configuration
//!
//! Supports project-level configuration with environment overrides.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high -> low):
//! 1. Environment variables (CONSTEVAL_*)
//! 2. Project-level (consteval.toml, [const_eval] table)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use consteval::util::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str("[const_eval]\nstep_budget = 500\n").unwrap();
//! assert_eq!(config.step_budget, 500);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "consteval.toml";

/// Configuration of the constant evaluation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Steps a single const function body may take before it is reported as non-terminating
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
    /// Maximum nesting of const calls inside one evaluation
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Evaluate independent call sites on a worker pool
    #[serde(default)]
    pub parallel: bool,
    /// Worker count for parallel evaluation (None = rayon default)
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_step_budget() -> usize {
    1_000_000
}

fn default_max_call_depth() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            max_call_depth: default_max_call_depth(),
            parallel: false,
            workers: None,
        }
    }
}

/// On-disk layout of `consteval.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    const_eval: EngineConfig,
}

impl EngineConfig {
    /// Set the step budget
    pub fn with_step_budget(
        mut self,
        step_budget: usize,
    ) -> Self {
        self.step_budget = step_budget;
        self
    }

    /// Set the maximum call depth
    pub fn with_max_call_depth(
        mut self,
        max_call_depth: usize,
    ) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Enable parallel evaluation with an optional worker count
    pub fn with_parallel(
        mut self,
        workers: Option<usize>,
    ) -> Self {
        self.parallel = true;
        self.workers = workers;
        self
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.const_eval.validate()
    }

    /// Load configuration from a file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize configuration as TOML text (inside the `[const_eval]` table)
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            const_eval: self.clone(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Apply `CONSTEVAL_*` environment overrides
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment by default)
    pub fn apply_overrides<F>(
        mut self,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CONSTEVAL_STEP_BUDGET") {
            self.step_budget = parse_env("CONSTEVAL_STEP_BUDGET", &raw)?;
        }
        if let Some(raw) = lookup("CONSTEVAL_MAX_CALL_DEPTH") {
            self.max_call_depth = parse_env("CONSTEVAL_MAX_CALL_DEPTH", &raw)?;
        }
        if let Some(raw) = lookup("CONSTEVAL_PARALLEL") {
            self.parallel = parse_env("CONSTEVAL_PARALLEL", &raw)?;
        }
        if let Some(raw) = lookup("CONSTEVAL_WORKERS") {
            self.workers = Some(parse_env("CONSTEVAL_WORKERS", &raw)?);
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.step_budget == 0 {
            return Err(ConfigError::Invalid {
                key: "step_budget".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "max_call_depth".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid {
                key: "workers".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    raw: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("cannot parse '{}'", raw),
    })
}

/// Find `consteval.toml` in `dir` or any of its ancestors
pub fn find_project_config(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Load the effective configuration for a project directory
///
/// Missing config file means defaults; environment overrides always apply.
pub fn load_config(project_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let base = match find_project_config(project_dir) {
        Some(path) => {
            tracing::debug!("loading const eval config from {}", path.display());
            EngineConfig::from_file(&path)?
        }
        None => EngineConfig::default(),
    };
    base.apply_env()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}
