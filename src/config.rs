use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_RETAINED_NAVIGATIONS: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read delegate config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Terminal navigations kept for lookup before the oldest are pruned.
    pub retained_navigations: usize,
    /// Log every individual responder verdict at debug level.
    pub trace_decisions: bool,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            retained_navigations: DEFAULT_RETAINED_NAVIGATIONS,
            trace_decisions: false,
        }
    }
}

impl DelegateConfig {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_yaml::from_str(&contents)?)
            }
            _ => Ok(Self::default()),
        }
    }
}
