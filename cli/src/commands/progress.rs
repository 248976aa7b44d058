// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Chunk progress rendering for write commands

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use podfs_core::{
    domain::{events::TransferEvent, session::SessionId},
    infrastructure::{event_bus::EventBusError, TransferEventBus},
};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:30.cyan/blue}] chunk {pos}/{len}";

/// Follows the session's transfer events until dropped or finished.
pub struct ProgressReporter {
    task: JoinHandle<()>,
    bar: ProgressBar,
}

impl ProgressReporter {
    /// `quiet` keeps the bar hidden (JSON output) while still draining events.
    pub fn start(event_bus: &TransferEventBus, session_id: &SessionId, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }

        let mut receiver = event_bus.subscribe_session(session_id.clone());
        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(TransferEvent::ChunkProgress(progress)) => {
                        task_bar.set_message(progress.file_name.clone());
                        task_bar.set_length(progress.total_chunks as u64);
                        task_bar.set_position(progress.current_chunk as u64);
                    }
                    Ok(TransferEvent::FileWritten { path, bytes_written, .. }) => {
                        task_bar.println(format!("  wrote {} ({} bytes)", path, bytes_written));
                    }
                    Err(EventBusError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Progress display lagged behind transfer events");
                    }
                    Err(_) => break,
                }
            }
        });

        Self { task, bar }
    }

    pub fn finish(self) {
        self.task.abort();
        self.bar.finish_and_clear();
    }
}
