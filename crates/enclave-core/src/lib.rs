//! Sandboxed execution of untrusted code snippets.
//!
//! A snippet is run in exactly one disposable, hardened container that is
//! always removed afterwards, and its output is reported back in a uniform
//! shape whether the guest program succeeded or not.
//!
//! # Architecture Overview
//!
//! - **Executors**: language catalog, injection-proof command building, timeout
//!   resolution, hardened container specs and the lifecycle state machine
//! - **Container runtimes**: the narrow engine contract with a Docker
//!   implementation and an in-memory test double
//! - **Tools**: the `code_execution` tool with schema-validated input
//! - **Configuration**: YAML configuration for connection, resource ceilings and logging

pub mod config;
pub mod errors;
pub mod executors;
pub mod tools;

pub use config::{ConfigLoader, EnclaveConfig};
pub use errors::{AgentError, ErrorKind, LifecycleStep, RuntimeError, SandboxError};
pub use executors::{CodeExecutor, ExecutionRequest, ExecutionResult, SandboxExecutor};
pub use tools::{Tool, ToolFactory, ToolOutput, ToolRegistry};
