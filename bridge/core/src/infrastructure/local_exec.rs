// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local process transport.
//!
//! Runs every command on this host with `tokio::process`, ignoring the pod
//! reference. Meant for single-node development and for exercising the
//! engine against a real shell in tests.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::domain::exec::{
    ExecOutput, ExecRequest, ExecSession, ExecStdin, ExecTransport, PodRef, PodStatus, TransportError,
};

#[derive(Debug, Clone, Default)]
pub struct LocalExecTransport;

impl LocalExecTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecTransport for LocalExecTransport {
    async fn exec(&self, pod: &PodRef, request: ExecRequest) -> Result<ExecSession, TransportError> {
        let (program, args) = request
            .argv
            .split_first()
            .ok_or_else(|| TransportError::Protocol("empty argv".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if request.attach_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().map(|s| Box::pin(s) as ExecStdin);
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::Protocol("stderr not captured".to_string()))?;

        let stdout = ReaderStream::new(stdout).map(|chunk| chunk.map(ExecOutput::StdOut).map_err(TransportError::Io));
        let stderr = ReaderStream::new(stderr).map(|chunk| chunk.map(ExecOutput::StdErr).map_err(TransportError::Io));
        let output = futures::stream::select(stdout, stderr).boxed();

        let completion = async move {
            let status = child.wait().await?;
            // Killed by a signal: no exit code.
            Ok(status.code().map(i64::from).unwrap_or(-1))
        }
        .boxed();

        debug!(pod = %pod, program = %program, "Started local process");
        Ok(ExecSession {
            stdin,
            output,
            completion,
        })
    }

    async fn pod_status(&self, _pod: &PodRef) -> Result<PodStatus, TransportError> {
        Ok(PodStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command_runner::CommandRunner;
    use std::sync::Arc;

    fn pod() -> PodRef {
        PodRef::new("local", "dev", "main")
    }

    #[tokio::test]
    async fn test_local_exec_captures_streams_and_exit_code() {
        let runner = CommandRunner::new(Arc::new(LocalExecTransport::new()));
        let result = runner
            .run_script(&pod(), "printf out; printf err >&2; exit 7")
            .await
            .unwrap();
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
        assert_eq!(result.exit_code, 7);
    }

    #[tokio::test]
    async fn test_local_exec_stdin_round_trip() {
        let runner = CommandRunner::new(Arc::new(LocalExecTransport::new())).with_stdin_slice_size(5);
        let result = runner
            .run_with_stdin(&pod(), vec!["cat".to_string()], b"hello stdin world")
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello stdin world");
    }

    #[tokio::test]
    async fn test_missing_program_is_transport_error() {
        let transport = LocalExecTransport::new();
        let err = transport
            .exec(&pod(), ExecRequest::new(vec!["/nonexistent/podfs-binary".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
