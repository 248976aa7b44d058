// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

/// Progress of one chunked write. Purely informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub session_id: SessionId,
    pub file_name: String,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub percent_complete: u8,
}

/// File-level events published by the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    ChunkProgress(ChunkProgress),
    FileWritten {
        session_id: SessionId,
        path: String,
        bytes_written: u64,
        chunks: usize,
        written_at: DateTime<Utc>,
    },
}

impl TransferEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            TransferEvent::ChunkProgress(progress) => &progress.session_id,
            TransferEvent::FileWritten { session_id, .. } => session_id,
        }
    }
}

/// Progress hook for write operations. Engines without an observer skip
/// notification entirely.
pub trait ChunkProgressObserver: Send + Sync {
    fn on_chunk_progress(&self, progress: &ChunkProgress);

    fn on_file_written(&self, _session_id: &SessionId, _path: &str, _bytes: u64, _chunks: usize) {}
}
