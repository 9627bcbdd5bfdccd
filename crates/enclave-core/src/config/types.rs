//! Configuration types for the sandbox engine
//!
//! Only resource ceilings and connection details are configurable. The
//! container hardening (network, filesystem, capabilities, privileges) is
//! fixed in code and has no configuration knob.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::AgentError;
use crate::executors::ResourceLimits;

const MIB: i64 = 1024 * 1024;
const MAX_CPU_LIMIT: f64 = 64.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnclaveConfig {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Docker engine connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Unix socket path or plain http/tcp URL; TLS hosts are rejected. `None` uses local defaults, which honor `DOCKER_HOST`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: i64,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    #[serde(default = "default_tmpfs_size_mb")]
    pub tmpfs_size_mb: i64,
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: usize,
    #[serde(default = "default_log_collection_timeout")]
    pub log_collection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_connect_timeout() -> u64 { 120 }
fn default_timeout_secs() -> u64 { 30 }
fn default_memory_limit_mb() -> i64 { 256 }
fn default_cpu_limit() -> f64 { 1.0 }
fn default_pids_limit() -> i64 { 64 }
fn default_tmpfs_size_mb() -> i64 { 64 }
fn default_max_code_bytes() -> usize { 64 * 1024 }
fn default_log_collection_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            memory_limit_mb: default_memory_limit_mb(),
            cpu_limit: default_cpu_limit(),
            pids_limit: default_pids_limit(),
            tmpfs_size_mb: default_tmpfs_size_mb(),
            max_code_bytes: default_max_code_bytes(),
            log_collection_timeout_secs: default_log_collection_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl SandboxConfig {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            memory_bytes: self.memory_limit_mb * MIB,
            cpu_nanos: (self.cpu_limit * 1_000_000_000.0) as i64,
            pids_limit: self.pids_limit,
            tmpfs_size_bytes: self.tmpfs_size_mb * MIB,
        }
    }
}

impl EnclaveConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        let sandbox = &self.sandbox;

        if sandbox.default_timeout_secs == 0 {
            return Err(AgentError::ConfigError("sandbox.default_timeout_secs must be greater than 0".to_string()));
        }
        if sandbox.memory_limit_mb <= 0 {
            return Err(AgentError::ConfigError("sandbox.memory_limit_mb must be greater than 0".to_string()));
        }
        if !(sandbox.cpu_limit > 0.0 && sandbox.cpu_limit <= MAX_CPU_LIMIT) {
            return Err(AgentError::ConfigError(format!(
                "sandbox.cpu_limit must be in (0, {}]",
                MAX_CPU_LIMIT
            )));
        }
        if sandbox.pids_limit <= 0 {
            return Err(AgentError::ConfigError("sandbox.pids_limit must be greater than 0".to_string()));
        }
        if sandbox.tmpfs_size_mb <= 0 {
            return Err(AgentError::ConfigError("sandbox.tmpfs_size_mb must be greater than 0".to_string()));
        }
        if sandbox.max_code_bytes == 0 {
            return Err(AgentError::ConfigError("sandbox.max_code_bytes must be greater than 0".to_string()));
        }
        if sandbox.log_collection_timeout_secs == 0 {
            return Err(AgentError::ConfigError("sandbox.log_collection_timeout_secs must be greater than 0".to_string()));
        }

        if let Some(host) = &self.docker.host {
            if host.trim().is_empty() {
                return Err(AgentError::ConfigError("docker.host cannot be empty".to_string()));
            }
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(AgentError::ConfigError(format!(
                "Unknown logging.level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }
}
