// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Transfer Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Feeds chunk progress to the CLI progress line and any other observer.
//
// In-memory only: events published with no subscriber are dropped.

use crate::domain::events::{ChunkProgress, ChunkProgressObserver, TransferEvent};
use crate::domain::session::SessionId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to transfer events
#[derive(Clone)]
pub struct TransferEventBus {
    sender: Arc<broadcast::Sender<TransferEvent>>,
}

impl TransferEventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: TransferEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all transfer events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for one session
    pub fn subscribe_session(&self, session_id: SessionId) -> SessionEventReceiver {
        SessionEventReceiver {
            receiver: self.sender.subscribe(),
            session_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ChunkProgressObserver for TransferEventBus {
    fn on_chunk_progress(&self, progress: &ChunkProgress) {
        self.publish(TransferEvent::ChunkProgress(progress.clone()));
    }

    fn on_file_written(&self, session_id: &SessionId, path: &str, bytes: u64, chunks: usize) {
        self.publish(TransferEvent::FileWritten {
            session_id: session_id.clone(),
            path: path.to_string(),
            bytes_written: bytes,
            chunks,
            written_at: Utc::now(),
        });
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all transfer events
pub struct EventReceiver {
    receiver: broadcast::Receiver<TransferEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<TransferEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<TransferEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for session-specific events (filtered)
pub struct SessionEventReceiver {
    receiver: broadcast::Receiver<TransferEvent>,
    session_id: SessionId,
}

impl SessionEventReceiver {
    /// Receive the next event for the subscribed session, skipping others
    pub async fn recv(&mut self) -> Result<TransferEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.session_id() == &self.session_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for TransferEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
