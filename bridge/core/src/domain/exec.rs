// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Exec Transport Contract
//!
//! Anti-corruption layer over whatever primitive the cluster offers for
//! running a command inside a container (Docker exec, kubelet exec, a local
//! process for development). The bridge never talks to a file share; every
//! file operation is a command sent through an [`ExecTransport`].
//!
//! One call to [`ExecTransport::exec`] opens one channel. There is no pooling
//! and no reuse of a remote shell between calls.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// Exec target: one container inside one pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
}

impl PodRef {
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.pod_name, self.container_name)
    }
}

/// A single command invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    /// Open a stdin channel for the remote process.
    pub attach_stdin: bool,
}

impl ExecRequest {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, attach_stdin: false }
    }

    pub fn with_stdin(argv: Vec<String>) -> Self {
        Self { argv, attach_stdin: true }
    }

    /// Program name, for logging.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// One frame of demultiplexed process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    StdOut(Bytes),
    StdErr(Bytes),
}

/// Writable stdin half of an exec channel. `poll_write` returning `Pending`
/// is the transport's backpressure signal.
pub type ExecStdin = Pin<Box<dyn AsyncWrite + Send>>;

/// An open exec channel.
///
/// `completion` must only be awaited after `output` is exhausted: some
/// transports (Docker) can only report the exit code once the attached
/// stream has closed.
pub struct ExecSession {
    pub stdin: Option<ExecStdin>,
    pub output: BoxStream<'static, Result<ExecOutput, TransportError>>,
    pub completion: BoxFuture<'static, Result<i64, TransportError>>,
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// Accumulated result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Lossy UTF-8 view of stdout.
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    /// Stdout exactly as received.
    #[serde(default)]
    pub stdout_bytes: Vec<u8>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Liveness of an exec target as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodStatus {
    /// Container is running and accepts exec.
    Running,
    /// Container exists but is not accepting exec yet (or anymore).
    NotReady(String),
    /// No container matches the pod reference.
    Missing,
}

/// Connection-level failures. Distinct from a command exiting non-zero,
/// which is reported through [`ExecResult::exit_code`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Pod not found: {0}")]
    PodNotFound(String),

    #[error("Container not ready: {0}")]
    ContainerNotReady(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ExecTransport: Send + Sync {
    /// Start `request.argv` inside the target container.
    async fn exec(&self, pod: &PodRef, request: ExecRequest) -> Result<ExecSession, TransportError>;

    /// Report whether the target container can currently accept exec.
    async fn pod_status(&self, pod: &PodRef) -> Result<PodStatus, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_ref_display() {
        let pod = PodRef::new("games", "mc-7f9c", "server");
        assert_eq!(pod.to_string(), "games/mc-7f9c[server]");
    }

    #[test]
    fn test_exec_request_program() {
        let req = ExecRequest::new(vec!["sh".into(), "-c".into(), "true".into()]);
        assert_eq!(req.program(), "sh");
        assert!(!req.attach_stdin);
        assert!(ExecRequest::with_stdin(vec![]).attach_stdin);
        assert_eq!(ExecRequest::new(vec![]).program(), "");
    }
}
