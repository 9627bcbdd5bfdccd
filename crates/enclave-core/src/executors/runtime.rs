//! The narrow set of container engine operations the executor relies on

use async_trait::async_trait;
use std::fmt;

use super::sandbox_spec::SandboxSpec;
use crate::errors::RuntimeError;

/// Opaque identifier of a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Idempotent: pulls the image only when it is not present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError>;

    async fn create_container(&self, spec: &SandboxSpec) -> Result<ContainerHandle, RuntimeError>;

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Resolves once the container is no longer running. `None` means the
    /// runtime gave no exit status. Dropping the future abandons the wait.
    async fn wait_container(&self, handle: &ContainerHandle) -> Result<Option<i64>, RuntimeError>;

    /// Combined stdout and stderr, stderr lines labeled.
    async fn get_logs(&self, handle: &ContainerHandle) -> Result<String, RuntimeError>;

    /// Forced removal, anonymous volumes included.
    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;
}
