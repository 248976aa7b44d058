// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pod File Model
//!
//! Value types returned by the file bridge and the error taxonomy every
//! bridge operation reports. API-layer callers get a message plus an
//! [`ErrorKind`]; remote stderr is summarized, never forwarded wholesale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::exec::{ExecResult, TransportError};

/// File type for listing entries and stat results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Directory,
    Regular,
    Symlink,
}

impl FileType {
    /// Leading character of a rendered permission string.
    pub fn mode_char(self) -> char {
        match self {
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
            FileType::Regular => '-',
        }
    }
}

/// Metadata for one remote entry. Built fresh on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Basename
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Size in bytes
    pub size: u64,
    /// Last modification time (epoch milliseconds)
    pub modify_time: i64,
    /// Absolute remote path
    pub path: String,
    /// Rendered mode, e.g. `drwxr-xr-x`
    pub permissions: String,
    /// Presentation hint only; never affects byte content.
    pub is_text: bool,
}

impl FileMetadata {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// One file in a bulk upload, placed under the upload base path.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub relative_path: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub path: String,
    pub content: Vec<u8>,
}

/// Stable error codes for the boundary layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SessionNotFound,
    SessionExpired,
    SessionNotReady,
    PodNotReady,
    PodExecFailed,
    FileNotFound,
    PermissionDenied,
    InvalidPath,
    TransportFailure,
    LocalFailure,
}

/// Errors raised by bridge operations
#[derive(Debug, Error)]
pub enum PodFileError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Session {id} is not ready (status: {status})")]
    SessionNotReady { id: String, status: String },

    #[error("Pod not ready: {0}")]
    PodNotReady(String),

    #[error("Remote command failed ({operation}, exit code {exit_code}): {stderr}")]
    PodExecFailed {
        operation: String,
        exit_code: i64,
        stderr: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transport failure: {0}")]
    Transport(TransportError),

    #[error("Local processing failed: {0}")]
    Local(String),
}

const STDERR_SUMMARY_LIMIT: usize = 512;

/// Shell exit status for a command that could not be found.
const COMMAND_NOT_FOUND_EXIT: i64 = 127;

impl PodFileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::SessionExpired(_) => ErrorKind::SessionExpired,
            Self::SessionNotReady { .. } => ErrorKind::SessionNotReady,
            Self::PodNotReady(_) => ErrorKind::PodNotReady,
            Self::PodExecFailed { .. } => ErrorKind::PodExecFailed,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::Transport(_) => ErrorKind::TransportFailure,
            Self::Local(_) => ErrorKind::LocalFailure,
        }
    }

    /// Non-zero exit reported as-is, without looking at stderr.
    pub fn exec_failed(operation: impl Into<String>, result: &ExecResult) -> Self {
        Self::PodExecFailed {
            operation: operation.into(),
            exit_code: result.exit_code,
            stderr: summarize_stderr(&result.stderr),
        }
    }

    /// Non-zero exit narrowed by stderr text to FileNotFound or
    /// PermissionDenied where possible.
    ///
    /// Exit 127 means the shell could not find a command (`sh: base64: not
    /// found`); that is a broken image, not a missing path.
    pub fn from_failed_command(operation: impl Into<String>, path: &str, result: &ExecResult) -> Self {
        if result.exit_code == COMMAND_NOT_FOUND_EXIT {
            return Self::exec_failed(operation, result);
        }
        let stderr = result.stderr.to_ascii_lowercase();
        if stderr.contains("no such file or directory") || stderr.contains("does not exist") {
            Self::FileNotFound(path.to_string())
        } else if stderr.contains("permission denied") || stderr.contains("operation not permitted") {
            Self::PermissionDenied(path.to_string())
        } else {
            Self::exec_failed(operation, result)
        }
    }
}

impl From<TransportError> for PodFileError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ContainerNotReady(msg) => PodFileError::PodNotReady(msg),
            other => PodFileError::Transport(other),
        }
    }
}

fn summarize_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_SUMMARY_LIMIT {
        return trimmed.to_string();
    }
    let mut end = STDERR_SUMMARY_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
