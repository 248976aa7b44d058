// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory session table.
//!
//! Owns the `Creating -> Ready | Error -> Terminating` lifecycle and backs
//! [`SessionManager`] for the file bridge. Pod liveness is probed through
//! the same [`ExecTransport`] that carries file commands.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::bridge_config::SessionConfig;
use crate::domain::exec::{ExecTransport, PodStatus, TransportError};
use crate::domain::session::{FileEditSession, SessionId, SessionManager, SessionStatus};

struct SessionEntry {
    session: FileEditSession,
    last_validated: Option<DateTime<Utc>>,
}

/// Session table keyed by [`SessionId`].
///
/// Thread-safe with RwLock; the lock is never held across a transport call.
#[derive(Clone)]
pub struct InMemorySessionManager {
    transport: Arc<dyn ExecTransport>,
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    idle_timeout: Duration,
    freshness_window: Duration,
}

impl InMemorySessionManager {
    pub fn new(transport: Arc<dyn ExecTransport>, config: &SessionConfig) -> Self {
        Self {
            transport,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: Duration::seconds(config.idle_timeout_secs as i64),
            freshness_window: Duration::seconds(config.freshness_window_secs as i64),
        }
    }

    /// Register a new session in `Creating` state.
    pub fn open_session(
        &self,
        deployment_name: &str,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
        user_id: &str,
    ) -> SessionId {
        let session = FileEditSession::new(deployment_name, namespace, pod_name, container_name, user_id);
        let id = session.id.clone();
        debug!(session_id = %id, pod = %session.pod_ref(), "Opened file edit session");
        self.sessions.write().insert(
            id.clone(),
            SessionEntry {
                session,
                last_validated: None,
            },
        );
        id
    }

    /// Probe the pod and move a `Creating` session to `Ready` or `Error`.
    /// A pod that exists but is not running yet leaves the session in
    /// `Creating` so the caller can retry.
    pub async fn activate(&self, id: &SessionId) -> Result<SessionStatus, TransportError> {
        let pod = {
            let sessions = self.sessions.read();
            let entry = sessions
                .get(id)
                .ok_or_else(|| TransportError::Protocol(format!("unknown session {}", id)))?;
            if entry.session.status != SessionStatus::Creating {
                return Ok(entry.session.status);
            }
            entry.session.pod_ref()
        };

        let (status, validated) = match self.transport.pod_status(&pod).await? {
            PodStatus::Running => (SessionStatus::Ready, true),
            PodStatus::NotReady(reason) => {
                debug!(session_id = %id, pod = %pod, reason = %reason, "Pod not running yet");
                (SessionStatus::Creating, false)
            }
            PodStatus::Missing => {
                warn!(session_id = %id, pod = %pod, "Pod not found, session failed");
                (SessionStatus::Error, false)
            }
        };

        if let Some(entry) = self.sessions.write().get_mut(id) {
            entry.session.status = status;
            if validated {
                entry.last_validated = Some(Utc::now());
            }
        }
        if status == SessionStatus::Ready {
            info!(session_id = %id, pod = %pod, "File edit session ready");
        }
        Ok(status)
    }

    /// Mark a session terminating and drop it from the table.
    pub fn close(&self, id: &SessionId) -> Option<FileEditSession> {
        let mut sessions = self.sessions.write();
        let mut entry = sessions.remove(id)?;
        entry.session.status = SessionStatus::Terminating;
        debug!(session_id = %id, "Closed file edit session");
        Some(entry.session)
    }

    /// Remove sessions idle past the timeout. Returns how many were removed.
    pub fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.session.idle_for(now) <= self.idle_timeout;
            if !keep {
                info!(session_id = %id, "Expiring idle file edit session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Run [`expire_idle`](Self::expire_idle) every `period` until
    /// `shutdown` is cancelled.
    pub fn spawn_idle_reaper(&self, period: std::time::Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let period = period.max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let expired = manager.expire_idle();
                        if expired > 0 {
                            debug!(expired, remaining = manager.count(), "Idle session sweep");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Idle session reaper stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn list(&self) -> Vec<FileEditSession> {
        self.sessions.read().values().map(|e| e.session.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    fn set_status(&self, id: &SessionId, status: SessionStatus) {
        if let Some(entry) = self.sessions.write().get_mut(id) {
            entry.session.status = status;
            entry.last_validated = None;
        }
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn get_session(&self, id: &SessionId) -> Option<FileEditSession> {
        self.sessions.read().get(id).map(|e| e.session.clone())
    }

    async fn validate_session(&self, id: &SessionId) -> bool {
        let now = Utc::now();
        let pod = {
            let sessions = self.sessions.read();
            let Some(entry) = sessions.get(id) else {
                return false;
            };
            if !entry.session.is_ready() {
                return false;
            }
            if entry.session.idle_for(now) > self.idle_timeout {
                debug!(session_id = %id, "Session idle past timeout");
                return false;
            }
            if let Some(validated) = entry.last_validated {
                if now - validated < self.freshness_window {
                    return true;
                }
            }
            entry.session.pod_ref()
        };

        match self.transport.pod_status(&pod).await {
            Ok(PodStatus::Running) => {
                if let Some(entry) = self.sessions.write().get_mut(id) {
                    entry.last_validated = Some(now);
                }
                true
            }
            Ok(PodStatus::NotReady(reason)) => {
                warn!(session_id = %id, pod = %pod, reason = %reason, "Pod stopped accepting exec");
                self.set_status(id, SessionStatus::Error);
                false
            }
            Ok(PodStatus::Missing) => {
                warn!(session_id = %id, pod = %pod, "Pod disappeared");
                self.set_status(id, SessionStatus::Error);
                false
            }
            Err(e) => {
                warn!(session_id = %id, pod = %pod, error = %e, "Pod status check failed");
                false
            }
        }
    }

    async fn refresh_activity(&self, id: &SessionId) {
        if let Some(entry) = self.sessions.write().get_mut(id) {
            entry.session.touch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exec::{ExecRequest, ExecSession, PodRef};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers pod_status from a mutable slot and counts probes.
    struct StatusTransport {
        status: Mutex<PodStatus>,
        probes: AtomicUsize,
    }

    impl StatusTransport {
        fn new(status: PodStatus) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(status),
                probes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExecTransport for StatusTransport {
        async fn exec(&self, pod: &PodRef, _request: ExecRequest) -> Result<ExecSession, TransportError> {
            Err(TransportError::PodNotFound(pod.to_string()))
        }

        async fn pod_status(&self, _pod: &PodRef) -> Result<PodStatus, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.status.lock().clone())
        }
    }

    fn config(freshness: u64) -> SessionConfig {
        SessionConfig {
            idle_timeout_secs: 60,
            freshness_window_secs: freshness,
            reap_interval_secs: 60,
        }
    }

    fn open(manager: &InMemorySessionManager) -> SessionId {
        manager.open_session("mc-server", "games", "mc-server-0", "main", "alice")
    }

    #[tokio::test]
    async fn test_activate_moves_to_ready_when_pod_running() {
        let transport = StatusTransport::new(PodStatus::Running);
        let manager = InMemorySessionManager::new(transport.clone(), &config(30));
        let id = open(&manager);

        assert_eq!(manager.get_session(&id).await.unwrap().status, SessionStatus::Creating);
        assert!(!manager.validate_session(&id).await);

        assert_eq!(manager.activate(&id).await.unwrap(), SessionStatus::Ready);
        assert!(manager.validate_session(&id).await);
        // Within the freshness window no further probe is made.
        assert_eq!(transport.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activate_keeps_creating_while_pod_starting() {
        let transport = StatusTransport::new(PodStatus::NotReady("created".to_string()));
        let manager = InMemorySessionManager::new(transport.clone(), &config(30));
        let id = open(&manager);

        assert_eq!(manager.activate(&id).await.unwrap(), SessionStatus::Creating);
        *transport.status.lock() = PodStatus::Running;
        assert_eq!(manager.activate(&id).await.unwrap(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_activate_missing_pod_is_error() {
        let transport = StatusTransport::new(PodStatus::Missing);
        let manager = InMemorySessionManager::new(transport, &config(30));
        let id = open(&manager);
        assert_eq!(manager.activate(&id).await.unwrap(), SessionStatus::Error);
        assert!(manager.activate(&SessionId::from("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_reprobes_and_fails_when_pod_gone() {
        let transport = StatusTransport::new(PodStatus::Running);
        let manager = InMemorySessionManager::new(transport.clone(), &config(0));
        let id = open(&manager);
        manager.activate(&id).await.unwrap();

        *transport.status.lock() = PodStatus::Missing;
        assert!(!manager.validate_session(&id).await);
        assert_eq!(manager.get_session(&id).await.unwrap().status, SessionStatus::Error);
        assert_eq!(transport.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_fails_validation() {
        let manager = InMemorySessionManager::new(StatusTransport::new(PodStatus::Running), &config(30));
        assert!(!manager.validate_session(&SessionId::from("missing")).await);
        assert!(manager.get_session(&SessionId::from("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let manager = InMemorySessionManager::new(StatusTransport::new(PodStatus::Running), &config(30));
        let id = open(&manager);
        manager.activate(&id).await.unwrap();

        manager.sessions.write().get_mut(&id).unwrap().session.last_activity =
            Utc::now() - Duration::seconds(120);
        assert!(!manager.validate_session(&id).await);

        manager.refresh_activity(&id).await;
        assert!(manager.validate_session(&id).await);

        manager.sessions.write().get_mut(&id).unwrap().session.last_activity =
            Utc::now() - Duration::seconds(120);
        let _fresh = open(&manager);
        assert_eq!(manager.expire_idle(), 1);
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test]
    async fn test_idle_reaper_sweeps_until_cancelled() {
        let manager = InMemorySessionManager::new(StatusTransport::new(PodStatus::Running), &config(30));
        let stale = open(&manager);
        manager.sessions.write().get_mut(&stale).unwrap().session.last_activity =
            Utc::now() - Duration::seconds(120);
        let fresh = open(&manager);

        let shutdown = CancellationToken::new();
        let reaper = manager.spawn_idle_reaper(std::time::Duration::from_millis(10), shutdown.clone());

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while manager.get_session(&stale).await.is_some() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stale session was never reaped");
        assert!(manager.get_session(&fresh).await.is_some());

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), reaper)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_removes_session() {
        let manager = InMemorySessionManager::new(StatusTransport::new(PodStatus::Running), &config(30));
        let id = open(&manager);
        let closed = manager.close(&id).unwrap();
        assert_eq!(closed.status, SessionStatus::Terminating);
        assert!(manager.close(&id).is_none());
        assert!(manager.list().is_empty());
    }
}
