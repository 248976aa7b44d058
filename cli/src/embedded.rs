// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process bridge
//!
//! Wires the transport, session table, event bus and file operations engine
//! for a single CLI invocation and opens one session against the target pod.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use podfs_core::{
    application::PodFileOperations,
    domain::{
        bridge_config::{BridgeConfigManifest, TransportBackend},
        exec::ExecTransport,
        session::{SessionId, SessionStatus},
    },
    infrastructure::{DockerExecTransport, InMemorySessionManager, LocalExecTransport, TransferEventBus},
};

/// Pod addressed by the global CLI flags.
#[derive(Debug, Clone)]
pub struct PodTarget {
    pub namespace: String,
    pub pod: String,
    /// Falls back to `spec.transport.default_container`
    pub container: Option<String>,
}

pub struct EmbeddedBridge {
    operations: PodFileOperations,
    sessions: Arc<InMemorySessionManager>,
    event_bus: TransferEventBus,
    session_id: SessionId,
    reaper_shutdown: CancellationToken,
}

impl EmbeddedBridge {
    pub async fn connect(config_path: Option<PathBuf>, target: PodTarget) -> Result<Self> {
        let config = BridgeConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;

        let transport: Arc<dyn ExecTransport> = match config.spec.transport.backend {
            TransportBackend::Docker => {
                let docker = DockerExecTransport::new(config.spec.transport.docker_socket_path.clone())?;
                docker.healthcheck().await?;
                Arc::new(docker)
            }
            TransportBackend::Local => {
                debug!("Using local process transport");
                Arc::new(LocalExecTransport::new())
            }
        };

        let sessions = Arc::new(InMemorySessionManager::new(transport.clone(), &config.spec.session));
        let event_bus = TransferEventBus::with_default_capacity();
        let operations = PodFileOperations::new(sessions.clone(), transport, config.spec.transfer.clone())
            .with_observer(Arc::new(event_bus.clone()));

        let container = target
            .container
            .unwrap_or_else(|| config.spec.transport.default_container.clone());
        let user = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
        let session_id = sessions.open_session(&target.pod, &target.namespace, &target.pod, &container, &user);

        let status = sessions
            .activate(&session_id)
            .await
            .with_context(|| format!("Failed to reach pod {}/{}", target.namespace, target.pod))?;
        if status != SessionStatus::Ready {
            sessions.close(&session_id);
            anyhow::bail!(
                "Pod {}/{} (container {}) is not available: session {}",
                target.namespace,
                target.pod,
                container,
                status
            );
        }

        let reaper_shutdown = CancellationToken::new();
        sessions.spawn_idle_reaper(
            Duration::from_secs(config.spec.session.reap_interval_secs),
            reaper_shutdown.clone(),
        );

        info!(session_id = %session_id, pod = %target.pod, "Connected to pod");
        Ok(Self {
            operations,
            sessions,
            event_bus,
            session_id,
            reaper_shutdown,
        })
    }

    pub fn operations(&self) -> &PodFileOperations {
        &self.operations
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn event_bus(&self) -> &TransferEventBus {
        &self.event_bus
    }

    pub fn close(self) {
        self.reaper_shutdown.cancel();
        self.sessions.close(&self.session_id);
    }
}
