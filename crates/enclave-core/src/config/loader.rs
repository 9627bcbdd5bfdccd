//! Configuration loader for YAML files
//!
//! Parses then validates, so a loaded configuration is always usable.

use crate::config::types::EnclaveConfig;
use crate::errors::AgentError;
use std::path::Path;
use tokio::fs;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<EnclaveConfig, AgentError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load a file if it exists, otherwise fall back to defaults
    pub async fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<EnclaveConfig, AgentError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(EnclaveConfig::default())
        }
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<EnclaveConfig, AgentError> {
        let config: EnclaveConfig = if content.trim().is_empty() {
            EnclaveConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                AgentError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }
}
