// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

use super::runtime::{ContainerHandle, ContainerRuntime};
use super::sandbox_spec::SandboxSpec;
use crate::config::DockerConfig;
use crate::errors::RuntimeError;

const STDERR_LABEL: &str = "[stderr] ";

/// Container runtime backed by the Docker Engine API.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(config: &DockerConfig) -> Result<Self, RuntimeError> {
        let timeout = config.connect_timeout_secs;
        let docker = match config.host.as_deref() {
            None => Docker::connect_with_local_defaults()?
                .with_timeout(Duration::from_secs(timeout)),
            Some(host) if host.starts_with("http://") || host.starts_with("tcp://") => {
                Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)?
            }
            Some(host) if host.starts_with("https://") => {
                return Err(RuntimeError::Other(format!(
                    "TLS Docker hosts are not supported: {}",
                    host
                )))
            }
            Some(host) => {
                Docker::connect_with_socket(host, timeout, API_DEFAULT_VERSION)?
            }
        };
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        log::info!("Pulling image {}", image);
        let options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(options, None, None);
        while let Some(progress) = pull_stream.next().await {
            if let Err(e) = progress {
                log::debug!("Failed to pull image {}: {}", image, e);
                return Err(RuntimeError::Docker(e));
            }
        }
        Ok(())
    }
}

/// Maps the hardened spec onto the Docker create request.
pub(crate) fn container_body(spec: &SandboxSpec) -> ContainerCreateBody {
    let tmpfs: HashMap<String, String> = spec
        .tmpfs_mounts
        .iter()
        .map(|(path, options)| (path.clone(), options.clone()))
        .collect();

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        user: Some(spec.user.clone()),
        working_dir: Some(spec.working_dir.clone()),
        network_disabled: Some(spec.network_disabled),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        attach_stdin: Some(false),
        open_stdin: Some(false),
        tty: Some(false),
        host_config: Some(HostConfig {
            memory: Some(spec.memory_limit_bytes),
            memory_swap: Some(spec.memory_swap_bytes),
            nano_cpus: Some(spec.cpu_nanos),
            pids_limit: Some(spec.pids_limit),
            network_mode: Some(spec.network_mode.clone()),
            readonly_rootfs: Some(spec.readonly_rootfs),
            tmpfs: Some(tmpfs),
            cap_drop: Some(spec.cap_drop.clone()),
            cap_add: Some(Vec::new()),
            security_opt: Some(spec.security_opt.clone()),
            privileged: Some(spec.privileged),
            binds: Some(Vec::new()),
            mounts: Some(Vec::new()),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Bollard surfaces a non-zero exit as a wait error; that is still an exit status.
/// A wait error carrying a daemon message is a failed wait, not a guest exit.
pub(crate) fn exit_code_from_wait(
    outcome: Option<Result<i64, BollardError>>,
) -> Result<Option<i64>, RuntimeError> {
    match outcome {
        Some(Ok(code)) => Ok(Some(code)),
        Some(Err(BollardError::DockerContainerWaitError { error, code, .. })) if error.is_empty() => {
            Ok(Some(code))
        }
        Some(Err(e)) => Err(RuntimeError::Docker(e)),
        None => Ok(None),
    }
}

/// Merges stdout and stderr frames into one text, labelling each stderr line once.
///
/// Frames follow the guest's writes, not line boundaries, so line state is
/// carried across frames.
pub(crate) struct LogMerger {
    output: String,
    at_line_start: bool,
}

impl LogMerger {
    pub(crate) fn new() -> Self {
        Self {
            output: String::new(),
            at_line_start: true,
        }
    }

    pub(crate) fn push(&mut self, chunk: &str, is_stderr: bool) {
        if chunk.is_empty() {
            return;
        }
        if is_stderr {
            for line in chunk.split_inclusive('\n') {
                if self.at_line_start {
                    self.output.push_str(STDERR_LABEL);
                }
                self.output.push_str(line);
            }
        } else {
            self.output.push_str(chunk);
        }
        self.at_line_start = chunk.ends_with('\n');
    }

    pub(crate) fn finish(self) -> String {
        self.output
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                log::debug!("Image {} already present", image);
                Ok(())
            }
            Err(e) if is_not_found(&e) => self.pull_image(image).await,
            Err(e) => Err(RuntimeError::Docker(e)),
        }
    }

    async fn create_container(&self, spec: &SandboxSpec) -> Result<ContainerHandle, RuntimeError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let container = self
            .docker
            .create_container(options, container_body(spec))
            .await?;
        for warning in &container.warnings {
            log::warn!("Docker warning for container {}: {}", container.id, warning);
        }
        Ok(ContainerHandle::new(container.id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<BollardStartContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, handle: &ContainerHandle) -> Result<Option<i64>, RuntimeError> {
        let mut wait_stream = self
            .docker
            .wait_container(handle.id(), None::<BollardWaitContainerOptionsQuery>);
        let outcome = wait_stream
            .next()
            .await
            .map(|res| res.map(|response| response.status_code));
        exit_code_from_wait(outcome)
    }

    async fn get_logs(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        let mut output_stream = self.docker.logs(
            handle.id(),
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut merger = LogMerger::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    merger.push(&String::from_utf8_lossy(&message), false)
                }
                LogOutput::StdErr { message } => {
                    merger.push(&String::from_utf8_lossy(&message), true)
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(merger.finish())
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            v: true,
            ..Default::default()
        });
        match self.docker.remove_container(handle.id(), options).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Err(RuntimeError::NotFound(handle.id().to_string())),
            Err(e) => Err(RuntimeError::Docker(e)),
        }
    }
}
