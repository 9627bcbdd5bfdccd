//! Code execution environments for sandboxed runtime evaluation.
//!
//! A request names a language and carries source text. The executor resolves
//! the language to a pinned image, wraps the source in an injection-proof
//! command, runs it in a single hardened, disposable container and always
//! removes that container afterwards. A guest exiting non-zero is reported as
//! data in the result, never as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    /// Seconds; zero or negative selects the configured default.
    #[serde(default, rename = "timeout")]
    pub timeout_seconds: i64,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            timeout_seconds: 0,
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Merged stdout and stderr; stderr lines are labeled.
    pub output: String,
    /// `None` when the runtime reported no exit status.
    pub exit_code: Option<i64>,
    pub language: String,
    pub image: String,
    pub duration_ms: u64,
    /// Set when the run succeeded but the container could not be removed.
    pub cleanup_error: Option<String>,
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError>;
}

pub mod command;
pub mod docker;
pub mod languages;
pub mod mock_runtime;
pub mod runtime;
pub mod sandbox;
pub mod sandbox_spec;
pub mod timeout;

pub use command::CommandBuilder;
pub use docker::DockerRuntime;
pub use languages::{LanguageCatalog, LanguageSpec};
pub use mock_runtime::{MockContainerRuntime, RuntimeCall};
pub use runtime::{ContainerHandle, ContainerRuntime};
pub use sandbox::SandboxExecutor;
pub use sandbox_spec::{ResourceLimits, SandboxSpec};
pub use timeout::TimeoutResolver;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_deserializes_tool_payload() {
        let request: ExecutionRequest =
            serde_json::from_value(json!({"language": "python", "code": "print(1)", "timeout": 5}))
                .unwrap();
        assert_eq!(request, ExecutionRequest::new("python", "print(1)").with_timeout(5));
    }

    #[test]
    fn test_request_timeout_is_optional() {
        let request: ExecutionRequest =
            serde_json::from_value(json!({"language": "sh", "code": "echo hi"})).unwrap();
        assert_eq!(request.timeout_seconds, 0);
    }
}
