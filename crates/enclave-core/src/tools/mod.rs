//! Tool system exposing the sandbox to callers
//!
//! A tool publishes metadata (name, description, JSON input schema) and
//! executes a JSON payload into a uniform output of text plus string metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;
use crate::executors::SandboxExecutor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: String,
    pub metadata: BTreeMap<String, String>,
}

// Core Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;
    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, AgentError>;
}

// Tool registry for managing multiple tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        self.tools.insert(name, tool);
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|tool| tool.metadata()).collect()
    }

    pub fn remove_tool(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Looks up a tool by name and runs it.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, AgentError> {
        let tool = self.get_tool(name).ok_or_else(|| AgentError::ToolError {
            tool_name: name.to_string(),
            message: "Tool not found".to_string(),
        })?;
        tool.execute(arguments, cancel).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ToolFactory;

impl ToolFactory {
    pub fn create_code_execution(executor: Arc<SandboxExecutor>) -> Result<Arc<dyn Tool>, AgentError> {
        Ok(Arc::new(code_execution::CodeExecutionTool::new(executor)?))
    }

    pub fn create_default_registry(executor: Arc<SandboxExecutor>) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Self::create_code_execution(executor)?);
        Ok(registry)
    }
}

pub mod code_execution;

pub use code_execution::CodeExecutionTool;
