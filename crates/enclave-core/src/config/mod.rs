//! Configuration module
//!
//! YAML configuration for the Docker connection, sandbox resource ceilings and
//! logging. Every field has a default, so an empty file is a valid configuration.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::AgentError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EnclaveConfig, AgentError> {
    ConfigLoader::from_file(path).await
}
