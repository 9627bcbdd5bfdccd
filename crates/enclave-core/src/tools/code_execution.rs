//! The `code_execution` tool
//!
//! Input is checked twice for language support: first by the JSON schema enum,
//! then again by the language catalog inside the executor, so a payload that
//! skips schema validation is still rejected.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;
use crate::executors::{CodeExecutor, ExecutionRequest, ExecutionResult, SandboxExecutor};
use crate::tools::{Tool, ToolMetadata, ToolOutput};

pub const TOOL_NAME: &str = "code_execution";
pub const UNKNOWN_EXIT_CODE: &str = "-1";

pub struct CodeExecutionTool {
    executor: Arc<SandboxExecutor>,
    input_schema: Value,
    validator: JSONSchema,
}

impl CodeExecutionTool {
    pub fn new(executor: Arc<SandboxExecutor>) -> Result<Self, AgentError> {
        let input_schema = Self::input_schema(&executor);
        let validator = JSONSchema::compile(&input_schema)
            .map_err(|e| AgentError::ConfigError(format!("Invalid input schema: {}", e)))?;
        Ok(Self {
            executor,
            input_schema,
            validator,
        })
    }

    fn input_schema(executor: &SandboxExecutor) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": executor.catalog().identifiers(),
                    "description": "Language of the code snippet"
                },
                "code": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Source code to run"
                },
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds; zero or negative uses the default of {}s",
                        executor.default_timeout().as_secs()
                    )
                }
            },
            "required": ["language", "code"],
            "additionalProperties": false
        })
    }

    /// Schema-level validation only; the executor applies its own checks afterwards.
    pub fn validate(&self, arguments: &Value) -> Result<(), AgentError> {
        if let Err(errors) = self.validator.validate(arguments) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(AgentError::ValidationError(format!(
                "Input validation failed: {}",
                messages.join("; ")
            )));
        }
        Ok(())
    }

    fn to_output(result: ExecutionResult) -> ToolOutput {
        let mut metadata = BTreeMap::new();
        metadata.insert("language".to_string(), result.language);
        metadata.insert("image".to_string(), result.image);
        match result.exit_code {
            Some(code) => {
                metadata.insert("exit_code".to_string(), code.to_string());
            }
            None => {
                metadata.insert("exit_code".to_string(), UNKNOWN_EXIT_CODE.to_string());
                metadata.insert("exit_code_known".to_string(), "false".to_string());
            }
        }
        metadata.insert("duration_ms".to_string(), result.duration_ms.to_string());
        if let Some(cleanup_error) = result.cleanup_error {
            metadata.insert("cleanup_error".to_string(), cleanup_error);
        }

        ToolOutput {
            data: result.output,
            metadata,
        }
    }
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: TOOL_NAME.to_string(),
            description: "Runs a short code snippet in a disposable, network-isolated container and returns its combined output and exit code".to_string(),
            input_schema: self.input_schema.clone(),
        }
    }

    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, AgentError> {
        self.validate(&arguments)?;

        let request: ExecutionRequest = serde_json::from_value(arguments)
            .map_err(|e| AgentError::ValidationError(format!("Malformed input: {}", e)))?;

        let result = self.executor.execute(&request, cancel).await?;
        Ok(Self::to_output(result))
    }
}
