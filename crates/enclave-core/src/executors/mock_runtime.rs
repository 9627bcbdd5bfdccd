//! Scriptable in-memory container runtime for tests
//!
//! Records every call it receives so lifecycle guarantees (ordering, exactly-once
//! removal) can be asserted without a Docker daemon.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::runtime::{ContainerHandle, ContainerRuntime};
use super::sandbox_spec::SandboxSpec;
use crate::errors::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCall {
    EnsureImage,
    Create,
    Start,
    Wait,
    GetLogs,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitBehavior {
    Exit,
    Hang,
    Delay(Duration),
    Panic,
}

pub struct MockContainerRuntime {
    exit_code: Option<i64>,
    logs: String,
    failing: Vec<RuntimeCall>,
    wait: WaitBehavior,
    create_delay: Option<Duration>,
    calls: Mutex<Vec<RuntimeCall>>,
    specs: Mutex<Vec<SandboxSpec>>,
}

impl MockContainerRuntime {
    pub fn new() -> Self {
        Self {
            exit_code: Some(0),
            logs: String::new(),
            failing: Vec::new(),
            wait: WaitBehavior::Exit,
            create_delay: None,
            calls: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i64>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.to_string();
        self
    }

    /// Makes the given operation return an error.
    pub fn failing_at(mut self, call: RuntimeCall) -> Self {
        self.failing.push(call);
        self
    }

    /// The wait never resolves on its own.
    pub fn hanging_on_wait(mut self) -> Self {
        self.wait = WaitBehavior::Hang;
        self
    }

    pub fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait = WaitBehavior::Delay(delay);
        self
    }

    /// Creation completes only after `delay`.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn panicking_on_wait(mut self) -> Self {
        self.wait = WaitBehavior::Panic;
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, call: RuntimeCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub fn last_spec(&self) -> Option<SandboxSpec> {
        self.specs.lock().unwrap().last().cloned()
    }

    fn record(&self, call: RuntimeCall) -> Result<(), RuntimeError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(&call) {
            return Err(RuntimeError::Other(format!("mock {:?} failure", call)));
        }
        Ok(())
    }
}

impl Default for MockContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::EnsureImage)
            .map_err(|_| RuntimeError::ImageUnavailable(image.to_string()))
    }

    async fn create_container(&self, spec: &SandboxSpec) -> Result<ContainerHandle, RuntimeError> {
        self.record(RuntimeCall::Create)?;
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.specs.lock().unwrap().push(spec.clone());
        Ok(ContainerHandle::new(format!("mock-{}", spec.name)))
    }

    async fn start_container(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Start)
    }

    async fn wait_container(&self, _handle: &ContainerHandle) -> Result<Option<i64>, RuntimeError> {
        self.record(RuntimeCall::Wait)?;
        match self.wait {
            WaitBehavior::Exit => {}
            WaitBehavior::Hang => std::future::pending::<()>().await,
            WaitBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            WaitBehavior::Panic => panic!("mock runtime panicked while waiting"),
        }
        Ok(self.exit_code)
    }

    async fn get_logs(&self, _handle: &ContainerHandle) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::GetLogs)?;
        Ok(self.logs.clone())
    }

    async fn remove_container(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Remove)
    }
}
