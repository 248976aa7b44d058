// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker Exec Transport
//!
//! [`ExecTransport`] over the Docker engine API. A pod reference is resolved
//! to a container through the labels the kubelet puts on every container it
//! starts; when no labelled container matches, a container named exactly
//! like the pod is used (plain Docker deployments).

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions};
use bollard::Docker;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::exec::{
    ExecOutput, ExecRequest, ExecSession, ExecTransport, PodRef, PodStatus, TransportError,
};

const LABEL_NAMESPACE: &str = "io.kubernetes.pod.namespace";
const LABEL_POD: &str = "io.kubernetes.pod.name";
const LABEL_CONTAINER: &str = "io.kubernetes.container.name";

/// Attempts made to read an exit code that Docker has not recorded yet.
const EXIT_CODE_ATTEMPTS: u32 = 20;
const EXIT_CODE_POLL: Duration = Duration::from_millis(50);

pub struct DockerExecTransport {
    docker: Docker,
}

impl DockerExecTransport {
    pub fn new(socket_path: Option<String>) -> Result<Self, TransportError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                TransportError::Connection(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                TransportError::Connection(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\n\
                     Try:\n\
                     - Check permissions: ls -la /var/run/docker.sock\n\
                     - Set spec.transport.docker_socket_path or PODFS_DOCKER_SOCKET",
                    e
                ))
            })?
        };

        Ok(Self { docker })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), TransportError> {
        self.docker.ping().await.map_err(|e| {
            TransportError::Connection(format!(
                "Cannot connect to Docker daemon: {}\n\nVerify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    /// Container id for `pod`, or `None` when nothing matches.
    async fn resolve_container(&self, pod: &PodRef) -> Result<Option<String>, TransportError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![
                format!("{}={}", LABEL_NAMESPACE, pod.namespace),
                format!("{}={}", LABEL_POD, pod.pod_name),
                format!("{}={}", LABEL_CONTAINER, pod.container_name),
            ],
        );
        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_docker_error)?;
        if let Some(id) = containers.into_iter().find_map(|c| c.id) {
            debug!(pod = %pod, container_id = %id, "Resolved pod container by kubelet labels");
            return Ok(Some(id));
        }

        match self
            .docker
            .inspect_container(&pod.pod_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(inspect.id),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(None),
            Err(e) => Err(map_docker_error(e)),
        }
    }

    async fn container_status(&self, container_id: &str) -> Result<PodStatus, TransportError> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(map_docker_error)?;
        let Some(state) = inspect.state else {
            return Ok(PodStatus::NotReady("state unknown".to_string()));
        };

        let running = state.running.unwrap_or(false);
        let paused = state.paused.unwrap_or(false);
        if running && !paused {
            Ok(PodStatus::Running)
        } else {
            let status = state
                .status
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            Ok(PodStatus::NotReady(status))
        }
    }
}

#[async_trait]
impl ExecTransport for DockerExecTransport {
    async fn exec(&self, pod: &PodRef, request: ExecRequest) -> Result<ExecSession, TransportError> {
        let container_id = self
            .resolve_container(pod)
            .await?
            .ok_or_else(|| TransportError::PodNotFound(pod.to_string()))?;

        let exec_config = CreateExecOptions {
            attach_stdin: Some(request.attach_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(request.argv.clone()),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(&container_id, exec_config)
            .await
            .map_err(map_docker_error)?;

        let start_opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let started = self
            .docker
            .start_exec(&exec.id, Some(start_opts))
            .await
            .map_err(map_docker_error)?;

        let (output, input) = match started {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => {
                return Err(TransportError::Protocol(
                    "exec started detached; no output stream".to_string(),
                ))
            }
        };

        let output = output
            .filter_map(|frame| async move {
                match frame {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(ExecOutput::StdOut(message)))
                    }
                    Ok(LogOutput::StdErr { message }) => Some(Ok(ExecOutput::StdErr(message))),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(TransportError::Connection(e.to_string()))),
                }
            })
            .boxed();

        let stdin = if request.attach_stdin {
            Some(input)
        } else {
            drop(input);
            None
        };

        let docker = self.docker.clone();
        let exec_id = exec.id.clone();
        let completion = async move {
            // The attached stream closes slightly before Docker records the
            // exit code.
            for _ in 0..EXIT_CODE_ATTEMPTS {
                let inspect = docker
                    .inspect_exec(&exec_id)
                    .await
                    .map_err(|e| TransportError::Protocol(format!("Failed to inspect exec: {}", e)))?;
                if inspect.running != Some(true) {
                    return Ok(inspect.exit_code.unwrap_or(-1));
                }
                tokio::time::sleep(EXIT_CODE_POLL).await;
            }
            Err(TransportError::Protocol(format!(
                "exec {} still running after its output closed",
                exec_id
            )))
        }
        .boxed();

        debug!(pod = %pod, container_id = %container_id, program = %request.program(), "Started docker exec");
        Ok(ExecSession {
            stdin,
            output,
            completion,
        })
    }

    async fn pod_status(&self, pod: &PodRef) -> Result<PodStatus, TransportError> {
        match self.resolve_container(pod).await? {
            Some(container_id) => {
                let status = self.container_status(&container_id).await?;
                info!(pod = %pod, status = ?status, "Checked pod container");
                Ok(status)
            }
            None => Ok(PodStatus::Missing),
        }
    }
}

fn map_docker_error(err: bollard::errors::Error) -> TransportError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, message } => {
            TransportError::PodNotFound(message)
        }
        // 409: container paused or not running
        bollard::errors::Error::DockerResponseServerError { status_code: 409, message } => {
            TransportError::ContainerNotReady(message)
        }
        other => TransportError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_error_mapping() {
        let not_found = map_docker_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: web-0".to_string(),
        });
        assert!(matches!(not_found, TransportError::PodNotFound(_)));

        let conflict = map_docker_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "Container abc is not running".to_string(),
        });
        assert!(matches!(conflict, TransportError::ContainerNotReady(_)));

        let server = map_docker_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        });
        assert!(matches!(server, TransportError::Connection(_)));
    }
}
