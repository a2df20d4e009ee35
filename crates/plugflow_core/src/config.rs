//! Host configuration file.
//!
//! ```yaml
//! extension_dirs: [plugins, /opt/plugflow/shared]
//! log_level: info
//! log_dir: /var/log/plugflow
//! limits:
//!   max_steps: 10000
//!   max_call_depth: 16
//! ```
//!
//! Relative `extension_dirs` are resolved against the config file's
//! directory when loaded with [`HostConfig::load`].

use crate::extension::loader::ExtensionLoader;
use crate::logging::{default_log_level, normalize_level};
use crate::workflow::WorkflowLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSION_DIR: &str = "plugins";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Scanned in order; earlier directories win name collisions.
    pub extension_dirs: Vec<PathBuf>,
    pub log_level: String,
    /// File logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub limits: WorkflowLimits,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            extension_dirs: vec![PathBuf::from(DEFAULT_EXTENSION_DIR)],
            log_level: default_log_level().to_string(),
            log_dir: None,
            limits: WorkflowLimits::default(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&source)?;
        if let Some(base) = path.parent() {
            config.extension_dirs = config
                .extension_dirs
                .into_iter()
                .map(|dir| if dir.is_relative() { base.join(dir) } else { dir })
                .collect();
        }
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = if source.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(source)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level).map_err(ConfigError::Invalid)?;
        if self.limits.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_steps must be at least 1".to_string(),
            ));
        }
        if self.limits.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_call_depth must be at least 1".to_string(),
            ));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Loader over the configured directories and limits, without builtins.
    pub fn loader(&self) -> ExtensionLoader {
        ExtensionLoader::new(self.extension_dirs.clone()).with_limits(self.limits.clone())
    }
}
