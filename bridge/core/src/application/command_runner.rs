// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command Runner
//!
//! Drives one [`ExecTransport`] channel to completion and folds its output
//! into an [`ExecResult`]. Every higher-level file operation is a sequence
//! of runner calls.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Single-command execution with full output capture

use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::exec::{
    ExecOutput, ExecRequest, ExecResult, ExecTransport, PodRef, TransportError,
};
use crate::domain::shell;

/// Default bytes per stdin write.
pub const DEFAULT_STDIN_SLICE_SIZE: usize = 64 * 1024;

/// Accumulates demultiplexed output frames for one command.
#[derive(Debug, Default)]
pub struct OutputSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputSink {
    pub fn accept(&mut self, frame: ExecOutput) {
        match frame {
            ExecOutput::StdOut(bytes) => self.stdout.extend_from_slice(&bytes),
            ExecOutput::StdErr(bytes) => self.stderr.extend_from_slice(&bytes),
        }
    }

    pub fn finish(self, exit_code: i64) -> ExecResult {
        ExecResult {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            exit_code,
            stdout_bytes: self.stdout,
        }
    }
}

#[derive(Clone)]
pub struct CommandRunner {
    transport: Arc<dyn ExecTransport>,
    stdin_slice_size: usize,
}

impl CommandRunner {
    pub fn new(transport: Arc<dyn ExecTransport>) -> Self {
        Self {
            transport,
            stdin_slice_size: DEFAULT_STDIN_SLICE_SIZE,
        }
    }

    pub fn with_stdin_slice_size(mut self, size: usize) -> Self {
        self.stdin_slice_size = size.max(1);
        self
    }

    /// Run `argv` and wait for it to exit. Resolves exactly once: the
    /// completion future is consumed after the output stream ends.
    pub async fn run(&self, pod: &PodRef, argv: Vec<String>) -> Result<ExecResult, TransportError> {
        let request = ExecRequest::new(argv);
        let program = request.program().to_string();
        let session = self.transport.exec(pod, request).await?;

        // No stdin for plain runs; close it if the transport opened one.
        drop(session.stdin);
        let mut output = session.output;
        let mut sink = OutputSink::default();
        drain(&mut output, &mut sink).await?;
        let exit_code = session.completion.await?;

        let result = sink.finish(exit_code);
        debug!(pod = %pod, program = %program, exit_code, "Remote command finished");
        Ok(result)
    }

    /// `sh -c <script>`
    pub async fn run_script(&self, pod: &PodRef, script: impl Into<String>) -> Result<ExecResult, TransportError> {
        self.run(pod, shell::sh(script)).await
    }

    /// Run `argv` feeding `content` to its stdin in fixed-size slices.
    ///
    /// Each slice waits for the transport to accept it before the next one
    /// is written; stdin is closed only after the final slice is flushed.
    /// Output is drained concurrently so a chatty process cannot stall the
    /// writer.
    pub async fn run_with_stdin(
        &self,
        pod: &PodRef,
        argv: Vec<String>,
        content: &[u8],
    ) -> Result<ExecResult, TransportError> {
        let request = ExecRequest::with_stdin(argv);
        let program = request.program().to_string();
        let session = self.transport.exec(pod, request).await?;

        let mut stdin = session
            .stdin
            .ok_or_else(|| TransportError::Protocol("transport did not open stdin".to_string()))?;
        let mut output = session.output;
        let mut sink = OutputSink::default();
        let slice_size = self.stdin_slice_size;

        let write = async move {
            for slice in content.chunks(slice_size) {
                stdin.write_all(slice).await?;
                stdin.flush().await?;
            }
            stdin.shutdown().await
        };
        let (written, drained) = tokio::join!(write, drain(&mut output, &mut sink));
        drained?;
        let exit_code = session.completion.await?;

        if let Err(e) = written {
            // A process that exits early closes stdin under us; its exit
            // code already tells the caller what happened.
            if exit_code == 0 {
                return Err(TransportError::Io(e));
            }
            debug!(pod = %pod, program = %program, error = %e, "Stdin closed by failing remote process");
        }

        let result = sink.finish(exit_code);
        debug!(
            pod = %pod,
            program = %program,
            exit_code,
            bytes = content.len(),
            "Remote command with stdin finished"
        );
        Ok(result)
    }
}

async fn drain(
    output: &mut BoxStream<'static, Result<ExecOutput, TransportError>>,
    sink: &mut OutputSink,
) -> Result<(), TransportError> {
    while let Some(frame) = output.next().await {
        sink.accept(frame?);
    }
    Ok(())
}
