//! Error types for sandboxed execution and the tool surface built on top of it
//!
//! Failures are split by who is at fault. Input errors are the caller's and are
//! raised before any container exists. Infrastructure errors belong to the
//! execution machinery (image, container lifecycle, engine communication).
//! Cleanup errors are reported separately so they never mask the outcome of
//! the run itself. A guest program exiting non-zero is not an error at all.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle states that can fail with an infrastructure error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    EnsureImage,
    CreateContainer,
    StartContainer,
    WaitForExit,
    CollectLogs,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStep::EnsureImage => "ensure image",
            LifecycleStep::CreateContainer => "create container",
            LifecycleStep::StartContainer => "start container",
            LifecycleStep::WaitForExit => "wait for exit",
            LifecycleStep::CollectLogs => "collect logs",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Infrastructure,
    Cleanup,
}

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("{step} failed for image {image}: {message}")]
    Infrastructure {
        step: LifecycleStep,
        image: String,
        message: String,
        partial_output: Option<String>,
    },
    #[error("Execution timed out after {}s", .after.as_secs())]
    Timeout {
        after: Duration,
        partial_output: Option<String>,
    },
    #[error("Execution cancelled while waiting for the container to exit")]
    Cancelled { partial_output: Option<String> },
    #[error("Failed to remove container {container_id}: {message}")]
    Cleanup {
        container_id: String,
        message: String,
    },
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::InvalidInput(_) | SandboxError::UnsupportedLanguage(_) => {
                ErrorKind::Input
            }
            SandboxError::Infrastructure { .. }
            | SandboxError::Timeout { .. }
            | SandboxError::Cancelled { .. } => ErrorKind::Infrastructure,
            SandboxError::Cleanup { .. } => ErrorKind::Cleanup,
        }
    }

    /// Output collected before the failure, if the run got far enough to produce any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            SandboxError::Infrastructure { partial_output, .. }
            | SandboxError::Timeout { partial_output, .. }
            | SandboxError::Cancelled { partial_output } => partial_output.as_deref(),
            _ => None,
        }
    }

    /// The lifecycle step that failed. Timeouts and cancellations are wait failures.
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            SandboxError::Infrastructure { step, .. } => Some(*step),
            SandboxError::Timeout { .. } | SandboxError::Cancelled { .. } => {
                Some(LifecycleStep::WaitForExit)
            }
            _ => None,
        }
    }

    pub(crate) fn with_partial_output(self, output: Option<String>) -> Self {
        match self {
            SandboxError::Infrastructure {
                step,
                image,
                message,
                partial_output,
            } => SandboxError::Infrastructure {
                step,
                image,
                message,
                partial_output: partial_output.or(output),
            },
            SandboxError::Timeout {
                after,
                partial_output,
            } => SandboxError::Timeout {
                after,
                partial_output: partial_output.or(output),
            },
            SandboxError::Cancelled { partial_output } => SandboxError::Cancelled {
                partial_output: partial_output.or(output),
            },
            other => other,
        }
    }
}

/// Errors reported by a container runtime implementation.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Bollard (Docker client) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("Image {0} is not available")]
    ImageUnavailable(String),
    #[error("Container {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolError { tool_name: String, message: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}
