//! Evaluator configuration
//!
//! Loaded from TOML, by default from `<config dir>/meander/evaluator.toml`.
//! Every key is optional:
//!
//! ```toml
//! default_samples_count = 2048
//! sampler_thread_name = "meander-sampler"
//! realloc_slack_divisor = 4
//! log_filter = "meander=debug"
//! ```

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::swap_chain::DEFAULT_REALLOC_SLACK_DIVISOR;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SAMPLES_COUNT: usize = 2048;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// Samples per signal when a project does not say
    pub default_samples_count: usize,

    /// Name of the background sampling threads
    pub sampler_thread_name: String,

    /// Back buffers larger than `required + required / divisor` are reallocated
    pub realloc_slack_divisor: usize,

    /// `tracing_subscriber::EnvFilter` directives for the CLI
    pub log_filter: Option<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            default_samples_count: DEFAULT_SAMPLES_COUNT,
            sampler_thread_name: "meander-sampler".to_string(),
            realloc_slack_divisor: DEFAULT_REALLOC_SLACK_DIVISOR,
            log_filter: None,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_toml_str(content: &str) -> EvaluatorResult<Self> {
        toml::from_str(content).map_err(|e| EvaluatorError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> EvaluatorResult<String> {
        toml::to_string_pretty(self).map_err(|e| EvaluatorError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> EvaluatorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/meander/evaluator.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("meander").join("evaluator.toml"))
    }

    /// Load `path`, or the default path when it exists, or defaults
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load_or_default(path: Option<&Path>) -> EvaluatorResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}
