// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File Edit Session
//!
//! A [`FileEditSession`] binds one caller's editor to one running pod. The
//! bridge never creates or mutates sessions itself; it reads them from a
//! [`SessionManager`] before every operation and asks for an activity
//! refresh afterwards.
//!
//! ## Session Lifecycle
//!
//! ```text
//! open_session(..)            -> Creating
//!   └─ pod confirmed running  -> Ready
//!   └─ pod missing / failed   -> Error
//! close / idle timeout        -> Terminating -> removed
//! ```
//!
//! ## Invariants
//!
//! - File operations are only permitted while `status == Ready`.
//! - A ready session must also pass [`SessionManager::validate_session`],
//!   which re-checks the live pod at most once per freshness window.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::exec::PodRef;

/// Opaque session token handed to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Target pod not yet confirmed running.
    Creating,
    /// Pod confirmed; file operations allowed.
    Ready,
    /// Pod vanished or failed to come up.
    Error,
    /// Close requested; no new operations.
    Terminating,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Terminating => "terminating",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEditSession {
    pub id: SessionId,
    pub deployment_name: String,
    pub pod_name: String,
    pub namespace: String,
    /// Container inside the pod that owns the volume mount.
    pub container_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
}

impl FileEditSession {
    pub fn new(
        deployment_name: impl Into<String>,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            deployment_name: deployment_name.into(),
            pod_name: pod_name.into(),
            namespace: namespace.into(),
            container_name: container_name.into(),
            user_id: user_id.into(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Creating,
        }
    }

    /// Exec target for this session.
    pub fn pod_ref(&self) -> PodRef {
        PodRef::new(&self.namespace, &self.pod_name, &self.container_name)
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Session lookup consumed by the file bridge.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn get_session(&self, id: &SessionId) -> Option<FileEditSession>;

    /// Pod-liveness check. `false` means the session must not be used.
    async fn validate_session(&self, id: &SessionId) -> bool;

    async fn refresh_activity(&self, id: &SessionId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_creating() {
        let session = FileEditSession::new("mc", "games", "mc-0", "server", "u-1");
        assert_eq!(session.status, SessionStatus::Creating);
        assert!(!session.is_ready());
        assert_eq!(session.pod_ref(), PodRef::new("games", "mc-0", "server"));
    }

    #[test]
    fn test_idle_for_tracks_last_activity() {
        let mut session = FileEditSession::new("mc", "games", "mc-0", "server", "u-1");
        session.last_activity = Utc::now() - Duration::minutes(5);
        assert!(session.idle_for(Utc::now()) >= Duration::minutes(5));
        session.touch();
        assert!(session.idle_for(Utc::now()) < Duration::minutes(1));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Terminating).unwrap();
        assert_eq!(json, "\"terminating\"");
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
    }
}
