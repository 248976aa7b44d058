// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session guard, command ordering and failure paths, observed through a
//! transport that records every script and answers from a rule table.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;

use podfs_core::application::PodFileOperations;
use podfs_core::domain::bridge_config::{SessionConfig, TransferConfig};
use podfs_core::domain::exec::{
    ExecOutput, ExecRequest, ExecSession, ExecTransport, PodRef, PodStatus, TransportError,
};
use podfs_core::domain::pod_files::{ErrorKind, PodFileError};
use podfs_core::domain::session::{FileEditSession, SessionId, SessionManager, SessionStatus};
use podfs_core::infrastructure::InMemorySessionManager;

#[derive(Clone, Default)]
struct Reply {
    exit_code: i64,
    stdout: String,
    stderr: String,
}

impl Reply {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    fn fail(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

type Rule = Box<dyn Fn(&str) -> Option<Reply> + Send + Sync>;

/// Records the `sh -c` script of every exec; the first matching rule
/// answers, otherwise the command succeeds silently.
struct ScriptedTransport {
    scripts: Mutex<Vec<String>>,
    rules: Vec<Rule>,
    status_checks: AtomicUsize,
    status: PodStatus,
}

impl ScriptedTransport {
    fn new(rules: Vec<Rule>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(Vec::new()),
            rules,
            status_checks: AtomicUsize::new(0),
            status: PodStatus::Running,
        })
    }

    fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

fn rule(prefix: &'static str, reply: Reply) -> Rule {
    Box::new(move |script: &str| script.starts_with(prefix).then(|| reply.clone()))
}

#[async_trait]
impl ExecTransport for ScriptedTransport {
    async fn exec(&self, _pod: &PodRef, request: ExecRequest) -> Result<ExecSession, TransportError> {
        let script = request.argv.last().cloned().unwrap_or_default();
        self.scripts.lock().unwrap().push(script.clone());
        let reply = self
            .rules
            .iter()
            .find_map(|r| r(&script))
            .unwrap_or_default();

        let frames = vec![
            Ok(ExecOutput::StdOut(Bytes::from(reply.stdout))),
            Ok(ExecOutput::StdErr(Bytes::from(reply.stderr))),
        ];
        let exit_code = reply.exit_code;
        Ok(ExecSession {
            stdin: None,
            output: futures::stream::iter(frames).boxed(),
            completion: Box::pin(async move { Ok(exit_code) }),
        })
    }

    async fn pod_status(&self, _pod: &PodRef) -> Result<PodStatus, TransportError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.clone())
    }
}

/// Session manager with a fixed answer, counting activity refreshes.
struct FixedSessions {
    session: Option<FileEditSession>,
    valid: bool,
    refreshes: AtomicUsize,
}

#[async_trait]
impl SessionManager for FixedSessions {
    async fn get_session(&self, id: &SessionId) -> Option<FileEditSession> {
        self.session.clone().filter(|s| &s.id == id)
    }

    async fn validate_session(&self, _id: &SessionId) -> bool {
        self.valid
    }

    async fn refresh_activity(&self, _id: &SessionId) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

fn ready_session() -> FileEditSession {
    let mut session = FileEditSession::new("mc-server", "games", "mc-server-0", "main", "alice");
    session.status = SessionStatus::Ready;
    session
}

fn engine(
    transport: Arc<ScriptedTransport>,
    sessions: Arc<dyn SessionManager>,
    chunk_size: usize,
) -> PodFileOperations {
    let config = TransferConfig {
        chunk_size,
        ..TransferConfig::default()
    };
    PodFileOperations::new(sessions, transport, config)
}

#[tokio::test]
async fn test_not_ready_session_makes_no_transport_calls() {
    let transport = ScriptedTransport::new(vec![]);
    let sessions = Arc::new(InMemorySessionManager::new(transport.clone(), &SessionConfig::default()));
    let id = sessions.open_session("mc-server", "games", "mc-server-0", "main", "alice");
    let ops = engine(transport.clone(), sessions, 30_000);

    let err = ops.list_files(&id, "/data").await.unwrap_err();
    assert!(matches!(err, PodFileError::SessionNotReady { .. }));
    let err = ops.write_file(&id, "/data/a.txt", b"x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionNotReady);

    assert!(transport.scripts().is_empty());
    assert_eq!(transport.status_checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let transport = ScriptedTransport::new(vec![]);
    let sessions = Arc::new(FixedSessions {
        session: None,
        valid: true,
        refreshes: AtomicUsize::new(0),
    });
    let ops = engine(transport.clone(), sessions, 30_000);

    let err = ops.read_file(&SessionId::from("nope"), "/data/a").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    assert!(transport.scripts().is_empty());
}

#[tokio::test]
async fn test_failed_liveness_is_expired() {
    let transport = ScriptedTransport::new(vec![]);
    let session = ready_session();
    let id = session.id.clone();
    let sessions = Arc::new(FixedSessions {
        session: Some(session),
        valid: false,
        refreshes: AtomicUsize::new(0),
    });
    let ops = engine(transport.clone(), sessions.clone(), 30_000);

    let err = ops.stat_file(&id, "/data/a").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionExpired);
    assert!(transport.scripts().is_empty());
    assert_eq!(sessions.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_successful_guard_refreshes_activity() {
    let transport = ScriptedTransport::new(vec![]);
    let session = ready_session();
    let id = session.id.clone();
    let sessions = Arc::new(FixedSessions {
        session: Some(session),
        valid: true,
        refreshes: AtomicUsize::new(0),
    });
    let ops = engine(transport, sessions.clone(), 30_000);

    ops.create_directory(&id, "/data/plugins").await.unwrap();
    assert_eq!(sessions.refreshes.load(Ordering::SeqCst), 1);
}

fn fixed_ready(transport: &Arc<ScriptedTransport>, chunk_size: usize) -> (PodFileOperations, SessionId) {
    let session = ready_session();
    let id = session.id.clone();
    let sessions = Arc::new(FixedSessions {
        session: Some(session),
        valid: true,
        refreshes: AtomicUsize::new(0),
    });
    (engine(transport.clone(), sessions, chunk_size), id)
}

#[tokio::test]
async fn test_write_issues_commands_in_order() {
    let transport = ScriptedTransport::new(vec![]);
    let (ops, id) = fixed_ready(&transport, 4);

    ops.write_file(&id, "/data/world/level.dat", b"0123456789").await.unwrap();

    let scripts = transport.scripts();
    assert_eq!(scripts.len(), 7);
    assert_eq!(scripts[0], "mkdir -p '/data/world'");
    assert!(scripts[1].starts_with(": > '/tmp/.podfs-upload-"));
    let tmp = scripts[1].trim_start_matches(": > ").to_string();

    let appended: Vec<Vec<u8>> = scripts[2..5]
        .iter()
        .map(|s| {
            assert!(s.ends_with(&format!(">> {}", tmp)), "append target in {}", s);
            let encoded = s
                .trim_start_matches("printf '%s' '")
                .split('\'')
                .next()
                .unwrap();
            BASE64.decode(encoded).unwrap()
        })
        .collect();
    assert_eq!(appended, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);

    assert_eq!(scripts[5], format!("base64 -d {} > '/data/world/level.dat'", tmp));
    assert_eq!(scripts[6], format!("rm -f -- {}", tmp));
}

#[tokio::test]
async fn test_failed_append_still_removes_temp_file() {
    let transport = ScriptedTransport::new(vec![rule(
        "printf",
        Reply::fail(1, "sh: write error: No space left on device"),
    )]);
    let (ops, id) = fixed_ready(&transport, 4);

    let err = ops.write_file(&id, "/data/big.bin", b"0123456789").await.unwrap_err();
    match &err {
        PodFileError::PodExecFailed { operation, exit_code, stderr } => {
            assert_eq!(operation, "append chunk 1/3");
            assert_eq!(*exit_code, 1);
            assert!(stderr.contains("No space left"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let scripts = transport.scripts();
    assert!(!scripts.iter().any(|s| s.starts_with("base64 -d")));
    assert!(scripts.last().unwrap().starts_with("rm -f -- '/tmp/.podfs-upload-"));
}

#[tokio::test]
async fn test_failed_decode_is_exec_failure() {
    let transport = ScriptedTransport::new(vec![rule("base64 -d", Reply::fail(1, "base64: invalid input"))]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let err = ops.write_file(&id, "/data/a.txt", b"abc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PodExecFailed);
    assert!(transport.scripts().last().unwrap().starts_with("rm -f -- "));
}

#[tokio::test]
async fn test_missing_base64_binary_is_exec_failure() {
    let transport = ScriptedTransport::new(vec![rule("base64", Reply::fail(127, "sh: base64: not found"))]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let err = ops.read_file(&id, "/data/present.txt").await.unwrap_err();
    match err {
        PodFileError::PodExecFailed { exit_code, ref stderr, .. } => {
            assert_eq!(exit_code, 127);
            assert_eq!(stderr, "sh: base64: not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.scripts(), vec!["base64 '/data/present.txt'".to_string()]);
}

const LISTING: &str = "/data/notes.md|12|1700000000|regular file|644\n\
                       /data/server.jar|2048|1700000000|regular file|644\n\
                       /data/plugins|4096|1700000000|directory|755\n\
                       /data/world.zip|204800|1700000000|regular file|644\n\
                       /data/empty.txt|0|1700000000|regular empty file|644\n";

#[tokio::test]
async fn test_mime_probe_is_batched_and_bounded() {
    let transport = ScriptedTransport::new(vec![
        rule("find", Reply::ok(LISTING)),
        rule("file", Reply::ok("text/markdown\napplication/java-archive\n")),
    ]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let entries = ops.list_files(&id, "/data").await.unwrap();
    let by_name = |name: &str| entries.iter().find(|e| e.name == name).unwrap().clone();
    assert!(by_name("notes.md").is_text);
    assert!(!by_name("server.jar").is_text);
    assert!(!by_name("world.zip").is_text);
    assert!(by_name("empty.txt").is_text);
    assert!(!by_name("plugins").is_text);
    assert_eq!(entries[0].name, "plugins");

    let probes: Vec<String> = transport
        .scripts()
        .into_iter()
        .filter(|s| s.starts_with("file "))
        .collect();
    assert_eq!(
        probes,
        vec!["file -b --mime-type -- '/data/notes.md' '/data/server.jar'".to_string()]
    );
}

#[tokio::test]
async fn test_missing_file_command_falls_back_to_extensions() {
    let transport = ScriptedTransport::new(vec![
        rule("find", Reply::ok(LISTING)),
        rule("file", Reply::fail(127, "sh: file: not found")),
    ]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let entries = ops.list_files(&id, "/data").await.unwrap();
    let notes = entries.iter().find(|e| e.name == "notes.md").unwrap();
    let jar = entries.iter().find(|e| e.name == "server.jar").unwrap();
    assert!(notes.is_text);
    assert!(!jar.is_text);
}

#[tokio::test]
async fn test_mismatched_mime_output_falls_back_to_extensions() {
    let transport = ScriptedTransport::new(vec![
        rule("find", Reply::ok(LISTING)),
        rule("file", Reply::ok("application/octet-stream\n")),
    ]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let entries = ops.list_files(&id, "/data").await.unwrap();
    let jar = entries.iter().find(|e| e.name == "server.jar").unwrap();
    assert!(!jar.is_text);
}

#[tokio::test]
async fn test_listing_permission_error_is_classified() {
    let transport = ScriptedTransport::new(vec![rule(
        "find",
        Reply::fail(1, "find: '/root/': Permission denied"),
    )]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let err = ops.list_files(&id, "/root").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_bulk_download_skips_failed_read() {
    let transport = ScriptedTransport::new(vec![
        rule("base64 '/data/a.txt'", Reply::ok(BASE64.encode("alpha"))),
        rule(
            "base64 '/data/b.txt'",
            Reply::fail(1, "base64: /data/b.txt: No such file or directory"),
        ),
        rule("base64 '/data/c.txt'", Reply::ok(BASE64.encode("gamma"))),
    ]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    let bundle = ops
        .download_multiple(
            &id,
            &[
                "/data/a.txt".to_string(),
                "/data/b.txt".to_string(),
                "/data/c.txt".to_string(),
            ],
        )
        .await
        .unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bundle)).unwrap();
    let mut contents = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(&mut entry, &mut text).unwrap();
        contents.push((entry.name().to_string(), text));
    }
    assert_eq!(
        contents,
        vec![
            ("a.txt".to_string(), "alpha".to_string()),
            ("c.txt".to_string(), "gamma".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_transport_not_ready_maps_to_pod_not_ready() {
    struct NotReadyTransport;

    #[async_trait]
    impl ExecTransport for NotReadyTransport {
        async fn exec(&self, pod: &PodRef, _request: ExecRequest) -> Result<ExecSession, TransportError> {
            Err(TransportError::ContainerNotReady(format!("{} is restarting", pod)))
        }

        async fn pod_status(&self, _pod: &PodRef) -> Result<PodStatus, TransportError> {
            Ok(PodStatus::Running)
        }
    }

    let session = ready_session();
    let id = session.id.clone();
    let sessions = Arc::new(FixedSessions {
        session: Some(session),
        valid: true,
        refreshes: AtomicUsize::new(0),
    });
    let ops = PodFileOperations::new(sessions, Arc::new(NotReadyTransport), TransferConfig::default());

    let err = ops.read_file(&id, "/data/a.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PodNotReady);
}

#[tokio::test]
async fn test_move_and_delete_command_shapes() {
    let transport = ScriptedTransport::new(vec![rule(
        "rm -- ",
        Reply::fail(1, "rm: can't remove '/data/gone.txt': No such file or directory"),
    )]);
    let (ops, id) = fixed_ready(&transport, 30_000);

    ops.move_file(&id, "/data/a.txt", "/data/archive/a.txt").await.unwrap();
    // A missing file is reported as a failed command, not as not-found.
    let err = ops.delete_file(&id, "/data/gone.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PodExecFailed);
    ops.delete_directory(&id, "/data/archive").await.unwrap();

    assert_eq!(
        transport.scripts(),
        vec![
            "mkdir -p '/data/archive'".to_string(),
            "mv -- '/data/a.txt' '/data/archive/a.txt'".to_string(),
            "rm -- '/data/gone.txt'".to_string(),
            "rm -rf -- '/data/archive'".to_string(),
        ]
    );
}
