//! One-shot container lifecycle: resolve, ensure image, create, start, wait,
//! collect logs, remove.
//!
//! Steps up to container creation fail fast with nothing to clean up. Once a
//! container exists it is owned by a [`ContainerGuard`], which removes it
//! exactly once on every exit path. Removal runs as its own task so neither
//! the caller's cancellation token nor the caller dropping the future can
//! orphan the container.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::command::CommandBuilder;
use super::languages::{LanguageCatalog, LanguageSpec};
use super::runtime::{ContainerHandle, ContainerRuntime};
use super::sandbox_spec::{ResourceLimits, SandboxSpec};
use super::timeout::TimeoutResolver;
use super::{CodeExecutor, ExecutionRequest, ExecutionResult};
use crate::config::SandboxConfig;
use crate::errors::{LifecycleStep, RuntimeError, SandboxError};

pub const DEFAULT_MAX_CODE_BYTES: usize = 64 * 1024;
pub const DEFAULT_LOG_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

struct ResolvedExecution {
    language: &'static LanguageSpec,
    spec: SandboxSpec,
    timeout: Duration,
}

enum WaitOutcome {
    Exited(Result<Option<i64>, RuntimeError>),
    TimedOut,
    Cancelled,
}

/// Owns a created container until it has been removed.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    released: bool,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle) -> Self {
        Self {
            runtime,
            handle,
            released: false,
        }
    }

    fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    fn spawn_removal(&self) -> JoinHandle<Result<(), SandboxError>> {
        let runtime = self.runtime.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            log::debug!("Removing container {}", handle);
            runtime
                .remove_container(&handle)
                .await
                .map_err(|e| SandboxError::Cleanup {
                    container_id: handle.id().to_string(),
                    message: e.to_string(),
                })
        })
    }

    async fn release(mut self) -> Result<(), SandboxError> {
        self.released = true;
        let container_id = self.handle.id().to_string();
        match self.spawn_removal().await {
            Ok(result) => result,
            Err(join_error) => Err(SandboxError::Cleanup {
                container_id,
                message: join_error.to_string(),
            }),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match tokio::runtime::Handle::try_current() {
            Ok(_) => {
                log::warn!(
                    "Container {} released on an abnormal path, removing in background",
                    self.handle
                );
                let removal = self.spawn_removal();
                let container_id = self.handle.id().to_string();
                tokio::spawn(async move {
                    if let Ok(Err(e)) = removal.await {
                        log::error!("Background removal of {} failed: {}", container_id, e);
                    }
                });
            }
            Err(_) => log::error!(
                "Container {} could not be removed: no async runtime available",
                self.handle
            ),
        }
    }
}

pub struct SandboxExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    catalog: LanguageCatalog,
    commands: CommandBuilder,
    timeouts: TimeoutResolver,
    limits: ResourceLimits,
    max_code_bytes: usize,
    log_collection_timeout: Duration,
}

impl SandboxExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            catalog: LanguageCatalog::new(),
            commands: CommandBuilder::new(),
            timeouts: TimeoutResolver::default(),
            limits: ResourceLimits::default(),
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
            log_collection_timeout: DEFAULT_LOG_COLLECTION_TIMEOUT,
        }
    }

    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: &SandboxConfig) -> Self {
        Self {
            runtime,
            catalog: LanguageCatalog::new(),
            commands: CommandBuilder::new(),
            timeouts: TimeoutResolver::new(Duration::from_secs(config.default_timeout_secs)),
            limits: config.resource_limits(),
            max_code_bytes: config.max_code_bytes,
            log_collection_timeout: Duration::from_secs(config.log_collection_timeout_secs),
        }
    }

    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeouts.default_duration()
    }

    fn resolve(&self, request: &ExecutionRequest) -> Result<ResolvedExecution, SandboxError> {
        if request.code.trim().is_empty() {
            return Err(SandboxError::InvalidInput(
                "code must not be empty".to_string(),
            ));
        }
        if request.code.len() > self.max_code_bytes {
            return Err(SandboxError::InvalidInput(format!(
                "code is {} bytes, limit is {}",
                request.code.len(),
                self.max_code_bytes
            )));
        }

        let language = self.catalog.resolve(&request.language)?;
        let command = self.commands.build(language, &request.code);
        let name = format!("enclave-{}-{}", language.id, Uuid::new_v4());
        let spec = SandboxSpec::hardened(name, language.image, command, &self.limits);

        Ok(ResolvedExecution {
            language,
            spec,
            timeout: self.timeouts.resolve(request.timeout_seconds),
        })
    }

    /// Creates the container in its own task and hands back a guard for it.
    ///
    /// If the caller stops waiting while the daemon is still creating, the
    /// undelivered guard is dropped inside that task and removes the container.
    async fn create_guarded(&self, spec: &SandboxSpec) -> Result<ContainerGuard, RuntimeError> {
        let runtime = self.runtime.clone();
        let spec = spec.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let created = runtime
                .create_container(&spec)
                .await
                .map(|handle| ContainerGuard::new(runtime, handle));
            if let Err(Ok(orphan)) = tx.send(created) {
                log::warn!("Container {} created after the caller left", orphan.handle());
            }
        });

        rx.await
            .map_err(|_| RuntimeError::Other("container creation task aborted".to_string()))?
    }

    async fn collect_logs(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        match tokio::time::timeout(self.log_collection_timeout, self.runtime.get_logs(handle)).await
        {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Other(format!(
                "log collection timed out after {}s",
                self.log_collection_timeout.as_secs()
            ))),
        }
    }

    /// Start, wait and collect. Never removes the container; the caller's guard does.
    async fn run(
        &self,
        guard: &ContainerGuard,
        plan: &ResolvedExecution,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let image = plan.language.image;
        let handle = guard.handle();

        self.runtime
            .start_container(handle)
            .await
            .map_err(|e| infrastructure(LifecycleStep::StartContainer, image, e))?;
        let started = Instant::now();

        let wait = tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            res = self.runtime.wait_container(handle) => WaitOutcome::Exited(res),
            _ = tokio::time::sleep(plan.timeout) => WaitOutcome::TimedOut,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let logs = self.collect_logs(handle).await;
        if let Err(e) = &logs {
            log::warn!("Could not collect logs from container {}: {}", handle, e);
        }

        match wait {
            WaitOutcome::Exited(Ok(exit_code)) => {
                let output =
                    logs.map_err(|e| infrastructure(LifecycleStep::CollectLogs, image, e))?;
                match exit_code {
                    Some(code) => log::info!(
                        "{} execution finished with exit code {} in {}ms",
                        plan.language.id,
                        code,
                        duration_ms
                    ),
                    None => log::warn!(
                        "{} execution finished in {}ms but the runtime reported no exit code",
                        plan.language.id,
                        duration_ms
                    ),
                }
                Ok(ExecutionResult {
                    output,
                    exit_code,
                    language: plan.language.id.to_string(),
                    image: image.to_string(),
                    duration_ms,
                    cleanup_error: None,
                })
            }
            WaitOutcome::Exited(Err(e)) => Err(infrastructure(LifecycleStep::WaitForExit, image, e)
                .with_partial_output(logs.ok())),
            WaitOutcome::TimedOut => {
                log::warn!(
                    "Execution timed out after {}s for container {}",
                    plan.timeout.as_secs(),
                    handle
                );
                Err(SandboxError::Timeout {
                    after: plan.timeout,
                    partial_output: logs.ok(),
                })
            }
            WaitOutcome::Cancelled => {
                log::warn!("Execution cancelled for container {}", handle);
                Err(SandboxError::Cancelled {
                    partial_output: logs.ok(),
                })
            }
        }
    }
}

fn infrastructure(step: LifecycleStep, image: &str, err: RuntimeError) -> SandboxError {
    SandboxError::Infrastructure {
        step,
        image: image.to_string(),
        message: err.to_string(),
        partial_output: None,
    }
}

#[async_trait]
impl CodeExecutor for SandboxExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let plan = self.resolve(request)?;
        let image = plan.language.image;
        log::info!(
            "Executing {} snippet ({} bytes) in {} with timeout {}s",
            plan.language.id,
            request.code.len(),
            image,
            plan.timeout.as_secs()
        );

        self.runtime
            .ensure_image(image)
            .await
            .map_err(|e| infrastructure(LifecycleStep::EnsureImage, image, e))?;

        let guard = self
            .create_guarded(&plan.spec)
            .await
            .map_err(|e| infrastructure(LifecycleStep::CreateContainer, image, e))?;
        log::debug!("Created container {} ({})", guard.handle(), plan.spec.name);

        let outcome = self.run(&guard, &plan, &cancel).await;
        let cleanup = guard.release().await;

        match (outcome, cleanup) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(mut result), Err(cleanup_error)) => {
                log::warn!("{}", cleanup_error);
                result.cleanup_error = Some(cleanup_error.to_string());
                Ok(result)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                log::error!("{} (after: {})", cleanup_error, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::executors::mock_runtime::{MockContainerRuntime, RuntimeCall};

    fn executor(mock: &Arc<MockContainerRuntime>) -> SandboxExecutor {
        SandboxExecutor::new(mock.clone())
    }

    fn python(code: &str) -> ExecutionRequest {
        ExecutionRequest::new("python", code)
    }

    #[tokio::test]
    async fn test_successful_run_follows_lifecycle_order() {
        let mock = Arc::new(MockContainerRuntime::new().with_logs("42\n"));
        let result = executor(&mock)
            .execute(&python("print(42)"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "42\n");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.language, "python");
        assert_eq!(result.image, "python:3.12-alpine");
        assert!(result.cleanup_error.is_none());
        assert_eq!(
            mock.calls(),
            vec![
                RuntimeCall::EnsureImage,
                RuntimeCall::Create,
                RuntimeCall::Start,
                RuntimeCall::Wait,
                RuntimeCall::GetLogs,
                RuntimeCall::Remove,
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let mock = Arc::new(MockContainerRuntime::new().with_exit_code(Some(3)));
        let result = executor(&mock)
            .execute(&python("import sys; sys.exit(3)"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(mock.call_count(RuntimeCall::Remove), 1);
    }

    #[tokio::test]
    async fn test_unknown_exit_code_is_preserved_as_none() {
        let mock = Arc::new(MockContainerRuntime::new().with_exit_code(None));
        let result = executor(&mock)
            .execute(&python("pass"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_input_errors_touch_nothing() {
        let mock = Arc::new(MockContainerRuntime::new());
        let executor = executor(&mock);

        for request in [
            ExecutionRequest::new("cobol", "DISPLAY 'HI'"),
            ExecutionRequest::new("python", ""),
            ExecutionRequest::new("python", " \n\t "),
            ExecutionRequest::new("python", "x".repeat(DEFAULT_MAX_CODE_BYTES + 1)),
        ] {
            let err = executor
                .execute(&request, CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Input);
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_image_failure_skips_container_work() {
        let mock = Arc::new(MockContainerRuntime::new().failing_at(RuntimeCall::EnsureImage));
        let err = executor(&mock)
            .execute(&python("print(1)"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::EnsureImage));
        assert!(err.to_string().contains("ensure image"));
        assert_eq!(mock.calls(), vec![RuntimeCall::EnsureImage]);
    }

    #[tokio::test]
    async fn test_create_failure_never_removes() {
        let mock = Arc::new(MockContainerRuntime::new().failing_at(RuntimeCall::Create));
        let err = executor(&mock)
            .execute(&python("print(1)"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::CreateContainer));
        assert_eq!(mock.call_count(RuntimeCall::Remove), 0);
    }

    #[tokio::test]
    async fn test_failures_after_create_remove_exactly_once() {
        for failing in [RuntimeCall::Start, RuntimeCall::Wait, RuntimeCall::GetLogs] {
            let mock = Arc::new(MockContainerRuntime::new().failing_at(failing));
            let err = executor(&mock)
                .execute(&python("print(1)"), CancellationToken::new())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Infrastructure, "{:?}", failing);
            assert_eq!(mock.call_count(RuntimeCall::Remove), 1, "{:?}", failing);
        }
    }

    #[tokio::test]
    async fn test_logs_are_collected_even_when_wait_fails() {
        let mock = Arc::new(
            MockContainerRuntime::new()
                .with_logs("partial")
                .failing_at(RuntimeCall::Wait),
        );
        let err = executor(&mock)
            .execute(&python("print(1)"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::WaitForExit));
        assert_eq!(err.partial_output(), Some("partial"));
        assert_eq!(mock.call_count(RuntimeCall::GetLogs), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_replace_result() {
        let mock = Arc::new(
            MockContainerRuntime::new()
                .with_logs("ok")
                .failing_at(RuntimeCall::Remove),
        );
        let result = executor(&mock)
            .execute(&python("print('ok')"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "ok");
        assert!(result.cleanup_error.unwrap().contains("Failed to remove container"));
    }

    #[tokio::test]
    async fn test_execution_error_wins_over_cleanup_error() {
        let mock = Arc::new(
            MockContainerRuntime::new()
                .failing_at(RuntimeCall::Start)
                .failing_at(RuntimeCall::Remove),
        );
        let err = executor(&mock)
            .execute(&python("print(1)"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(LifecycleStep::StartContainer));
    }

    #[tokio::test]
    async fn test_cancellation_still_collects_and_removes() {
        let mock = Arc::new(MockContainerRuntime::new().with_logs("so far").hanging_on_wait());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = executor(&mock)
            .execute(&python("while True: pass"), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Cancelled { .. }));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.partial_output(), Some("so far"));
        assert_eq!(mock.call_count(RuntimeCall::GetLogs), 1);
        assert_eq!(mock.call_count(RuntimeCall::Remove), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_wait_failure() {
        let mock = Arc::new(MockContainerRuntime::new().hanging_on_wait());
        let err = executor(&mock)
            .execute(&python("while True: pass").with_timeout(1), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Timeout { after, .. } if after == Duration::from_secs(1)));
        assert_eq!(err.step(), Some(LifecycleStep::WaitForExit));
        assert_eq!(mock.call_count(RuntimeCall::Remove), 1);
    }

    #[tokio::test]
    async fn test_panic_during_wait_still_removes_container() {
        let mock = Arc::new(MockContainerRuntime::new().panicking_on_wait());
        let executor = Arc::new(executor(&mock));

        let task = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(&python("print(1)"), CancellationToken::new())
                    .await
            })
        };
        assert!(task.await.unwrap_err().is_panic());

        for _ in 0..20 {
            if mock.call_count(RuntimeCall::Remove) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mock.call_count(RuntimeCall::Remove), 1);
    }

    #[tokio::test]
    async fn test_dropping_call_during_create_still_removes_container() {
        let mock = Arc::new(
            MockContainerRuntime::new().with_create_delay(Duration::from_millis(100)),
        );
        let executor = executor(&mock);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            executor.execute(&python("print(1)"), CancellationToken::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(mock.call_count(RuntimeCall::Remove), 0);

        for _ in 0..50 {
            if mock.call_count(RuntimeCall::Remove) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mock.call_count(RuntimeCall::Create), 1);
        assert_eq!(mock.call_count(RuntimeCall::Start), 0);
        assert_eq!(mock.call_count(RuntimeCall::Remove), 1);
    }

    #[tokio::test]
    async fn test_spec_is_hardened_for_every_language() {
        for language in LanguageCatalog::new().identifiers() {
            let mock = Arc::new(MockContainerRuntime::new());
            executor(&mock)
                .execute(&ExecutionRequest::new(language, "true"), CancellationToken::new())
                .await
                .unwrap();

            let spec = mock.last_spec().unwrap();
            assert!(spec.name.starts_with(&format!("enclave-{}-", language)));
            assert!(spec.network_disabled);
            assert!(spec.readonly_rootfs);
            assert!(!spec.privileged);
            assert_eq!(spec.memory_swap_bytes, spec.memory_limit_bytes);
        }
    }
}
