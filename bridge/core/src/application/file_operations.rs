// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pod File Operations Application Service
//!
//! The public face of the bridge. Every operation:
//! 1. passes the session guard ([`PodFileOperations::validate_and_get_session`]),
//! 2. canonicalizes caller paths,
//! 3. issues one or more remote commands through the [`CommandRunner`],
//! 4. maps non-zero exits to [`PodFileError`].
//!
//! Coordinates:
//! - Domain layer: session model, shell command surface, listing parser,
//!   chunked transfer codec
//! - Infrastructure layer: local archive extraction and zip packing
//! - Progress observer: chunk progress for writes

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::command_runner::CommandRunner;
use crate::domain::bridge_config::TransferConfig;
use crate::domain::events::{ChunkProgress, ChunkProgressObserver};
use crate::domain::exec::{ExecTransport, PodRef};
use crate::domain::listing;
use crate::domain::path_sanitizer::{base_name, join, parent_dir, PathSanitizer};
use crate::domain::pod_files::{DownloadedFile, FileMetadata, PodFileError, UploadFile};
use crate::domain::session::{FileEditSession, SessionId, SessionManager, SessionStatus};
use crate::domain::shell;
use crate::domain::transfer::{self, ChunkPlan, TransferMode};
use crate::infrastructure::archive::{self, ArchiveFormat, ZipBuilder};

pub type Result<T> = std::result::Result<T, PodFileError>;

/// Upper bound on quoted path bytes passed to one `file` invocation.
const MIME_BATCH_ARG_BUDGET: usize = 64 * 1024;

pub struct PodFileOperations {
    sessions: Arc<dyn SessionManager>,
    runner: CommandRunner,
    config: TransferConfig,
    sanitizer: PathSanitizer,
    observer: Option<Arc<dyn ChunkProgressObserver>>,
}

impl PodFileOperations {
    pub fn new(
        sessions: Arc<dyn SessionManager>,
        transport: Arc<dyn ExecTransport>,
        config: TransferConfig,
    ) -> Self {
        let runner = CommandRunner::new(transport).with_stdin_slice_size(config.stdin_slice_size);
        Self {
            sessions,
            runner,
            config,
            sanitizer: PathSanitizer::new(),
            observer: None,
        }
    }

    /// Report chunk progress of every write to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ChunkProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Session guard run before every operation.
    ///
    /// Order matters: a session that is not `Ready` is rejected before any
    /// liveness probe reaches the transport.
    pub async fn validate_and_get_session(&self, session_id: &SessionId) -> Result<FileEditSession> {
        let session = self
            .sessions
            .get_session(session_id)
            .await
            .ok_or_else(|| PodFileError::SessionNotFound(session_id.to_string()))?;

        if session.status != SessionStatus::Ready {
            return Err(PodFileError::SessionNotReady {
                id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }

        if !self.sessions.validate_session(session_id).await {
            return Err(PodFileError::SessionExpired(session_id.to_string()));
        }

        self.sessions.refresh_activity(session_id).await;
        Ok(session)
    }

    fn canonical(&self, path: &str) -> Result<String> {
        self.sanitizer
            .canonicalize(path)
            .map_err(|e| PodFileError::InvalidPath(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Listing and metadata
    // ------------------------------------------------------------------

    /// Direct children of `dir`, directories first, then by name.
    pub async fn list_files(&self, session_id: &SessionId, dir: &str) -> Result<Vec<FileMetadata>> {
        let session = self.validate_and_get_session(session_id).await?;
        let dir = self.canonical(dir)?;
        let pod = session.pod_ref();

        let mut entries = self.run_listing(&pod, &dir, shell::list_directory(&dir)).await?;
        self.classify_text(&pod, &mut entries).await;
        entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));

        debug!(session_id = %session_id, dir = %dir, entries = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Every entry below `dir`, ordered by path.
    pub async fn list_files_recursive(&self, session_id: &SessionId, dir: &str) -> Result<Vec<FileMetadata>> {
        let session = self.validate_and_get_session(session_id).await?;
        let dir = self.canonical(dir)?;
        let pod = session.pod_ref();

        let mut entries = self
            .run_listing(&pod, &dir, shell::list_directory_recursive(&dir))
            .await?;
        self.classify_text(&pod, &mut entries).await;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(session_id = %session_id, dir = %dir, entries = entries.len(), "Listed directory tree");
        Ok(entries)
    }

    pub async fn stat_file(&self, session_id: &SessionId, path: &str) -> Result<FileMetadata> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        let pod = session.pod_ref();

        let result = self.runner.run_script(&pod, shell::stat_entry(&path)).await?;
        if !result.success() {
            return Err(PodFileError::FileNotFound(path));
        }
        let meta = listing::parse_stat(&path, &result.stdout)
            .ok_or_else(|| PodFileError::Local(format!("unexpected stat output for {}", path)))?;

        let mut entries = vec![meta];
        self.classify_text(&pod, &mut entries).await;
        entries
            .pop()
            .ok_or_else(|| PodFileError::Local(format!("stat result for {} lost", path)))
    }

    async fn run_listing(&self, pod: &PodRef, dir: &str, script: String) -> Result<Vec<FileMetadata>> {
        let result = self.runner.run_script(pod, script).await?;
        if !result.success() {
            if result.stdout.trim().is_empty() {
                return Err(PodFileError::from_failed_command("list directory", dir, &result));
            }
            // find keeps going past unreadable subdirectories.
            warn!(
                dir = %dir,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "Listing finished with errors, returning readable entries"
            );
        }
        Ok(listing::parse_listing(&result.stdout))
    }

    /// Best-effort text classification. Never fails the caller.
    async fn classify_text(&self, pod: &PodRef, entries: &mut [FileMetadata]) {
        let limit = self.config.text_detection_limit;
        let candidates: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| listing::needs_mime_probe(e, limit))
            .map(|(i, _)| i)
            .collect();

        for batch in mime_batches(entries, &candidates) {
            let paths: Vec<&str> = batch.iter().map(|&i| entries[i].path.as_str()).collect();
            let mimes = self.detect_mime(pod, &paths).await;
            for (n, &i) in batch.iter().enumerate() {
                entries[i].is_text = match &mimes {
                    Some(mimes) => listing::is_text_mime(&mimes[n]),
                    None => listing::is_text_extension(&entries[i].name),
                };
            }
        }
    }

    async fn detect_mime(&self, pod: &PodRef, paths: &[&str]) -> Option<Vec<String>> {
        let script = shell::detect_mime(paths.iter().copied());
        match self.runner.run_script(pod, script).await {
            Ok(result) if result.success() => {
                let lines: Vec<String> = result.stdout.lines().map(|l| l.trim().to_string()).collect();
                if lines.len() == paths.len() {
                    Some(lines)
                } else {
                    warn!(
                        expected = paths.len(),
                        received = lines.len(),
                        "MIME detection line count mismatch, using extension heuristic"
                    );
                    None
                }
            }
            Ok(result) => {
                warn!(
                    exit_code = result.exit_code,
                    "MIME detection unavailable, using extension heuristic"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "MIME detection failed, using extension heuristic");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    pub async fn read_file(&self, session_id: &SessionId, path: &str) -> Result<Vec<u8>> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        self.read_remote(&session.pod_ref(), &path).await
    }

    pub async fn download_file(&self, session_id: &SessionId, path: &str) -> Result<DownloadedFile> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        let content = self.read_remote(&session.pod_ref(), &path).await?;
        Ok(DownloadedFile {
            name: base_name(&path).to_string(),
            path,
            content,
        })
    }

    async fn read_remote(&self, pod: &PodRef, path: &str) -> Result<Vec<u8>> {
        let result = self.runner.run_script(pod, transfer::read_command(path)).await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("read file", path, &result));
        }
        transfer::decode_read_output(&result.stdout_bytes)
            .map_err(|e| PodFileError::Local(format!("invalid base64 read from {}: {}", path, e)))
    }

    /// Write `content` to `path`, creating missing parents.
    pub async fn write_file(&self, session_id: &SessionId, path: &str, content: &[u8]) -> Result<()> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        self.write_remote(&session, &path, content).await
    }

    async fn write_remote(&self, session: &FileEditSession, path: &str, content: &[u8]) -> Result<()> {
        let pod = session.pod_ref();

        let parent = parent_dir(path);
        let result = self.runner.run_script(&pod, shell::make_dirs(parent)).await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("create parent directory", parent, &result));
        }

        let temp = RemoteTempFile::new(
            self.runner.clone(),
            pod.clone(),
            transfer::temp_upload_path(&self.config.temp_dir),
        );
        let outcome = self
            .transfer_chunks(&session.id, &pod, temp.path(), path, content)
            .await;
        temp.release().await;
        let chunks = outcome?;

        if let Some(observer) = &self.observer {
            observer.on_file_written(&session.id, path, content.len() as u64, chunks);
        }
        info!(
            session_id = %session.id,
            path = %path,
            bytes = content.len(),
            chunks,
            "File written"
        );
        Ok(())
    }

    /// Truncate, append every slice in order, then decode. Returns the
    /// number of slices sent.
    async fn transfer_chunks(
        &self,
        session_id: &SessionId,
        pod: &PodRef,
        tmp: &str,
        target: &str,
        content: &[u8],
    ) -> Result<usize> {
        let result = self.runner.run_script(pod, transfer::truncate_command(tmp)).await?;
        if !result.success() {
            return Err(PodFileError::exec_failed("create temp file", &result));
        }

        let plan = ChunkPlan::new(content, self.config.chunk_size);
        let total = plan.total();
        let file_name = base_name(target);

        for (index, chunk) in plan.iter() {
            let result = match self.config.mode {
                TransferMode::Argv => {
                    self.runner
                        .run_script(pod, transfer::append_command(tmp, chunk))
                        .await?
                }
                TransferMode::Stdin => {
                    self.runner
                        .run_with_stdin(
                            pod,
                            shell::sh(transfer::stdin_append_command(tmp)),
                            chunk.as_bytes(),
                        )
                        .await?
                }
            };
            if !result.success() {
                return Err(PodFileError::exec_failed(
                    format!("append chunk {}/{}", index, total),
                    &result,
                ));
            }
            self.notify_progress(session_id, file_name, index, total);
        }

        let result = self
            .runner
            .run_script(pod, transfer::decode_command(tmp, target))
            .await?;
        if !result.success() {
            return Err(PodFileError::exec_failed("decode upload", &result));
        }
        Ok(total)
    }

    fn notify_progress(&self, session_id: &SessionId, file_name: &str, current: usize, total: usize) {
        if let Some(observer) = &self.observer {
            observer.on_chunk_progress(&ChunkProgress {
                session_id: session_id.clone(),
                file_name: file_name.to_string(),
                current_chunk: current,
                total_chunks: total,
                percent_complete: transfer::percent_complete(current, total),
            });
        }
    }

    // ------------------------------------------------------------------
    // Namespace mutations
    // ------------------------------------------------------------------

    /// Fails when `path` does not exist.
    pub async fn delete_file(&self, session_id: &SessionId, path: &str) -> Result<()> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;

        let result = self
            .runner
            .run_script(&session.pod_ref(), shell::remove_file(&path))
            .await?;
        if !result.success() {
            return Err(PodFileError::exec_failed("delete file", &result));
        }
        info!(session_id = %session_id, path = %path, "File deleted");
        Ok(())
    }

    pub async fn create_directory(&self, session_id: &SessionId, path: &str) -> Result<()> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;

        let result = self
            .runner
            .run_script(&session.pod_ref(), shell::make_dirs(&path))
            .await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("create directory", &path, &result));
        }
        info!(session_id = %session_id, path = %path, "Directory created");
        Ok(())
    }

    /// Recursive and idempotent.
    pub async fn delete_directory(&self, session_id: &SessionId, path: &str) -> Result<()> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        if path == "/" {
            return Err(PodFileError::InvalidPath("refusing to delete the root directory".to_string()));
        }

        let result = self
            .runner
            .run_script(&session.pod_ref(), shell::remove_tree(&path))
            .await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("delete directory", &path, &result));
        }
        info!(session_id = %session_id, path = %path, "Directory deleted");
        Ok(())
    }

    /// Rename within the pod filesystem, creating the destination parent.
    pub async fn move_file(&self, session_id: &SessionId, from: &str, to: &str) -> Result<()> {
        let session = self.validate_and_get_session(session_id).await?;
        let from = self.canonical(from)?;
        let to = self.canonical(to)?;
        let pod = session.pod_ref();

        let parent = parent_dir(&to);
        let result = self.runner.run_script(&pod, shell::make_dirs(parent)).await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("create destination directory", parent, &result));
        }

        let result = self.runner.run_script(&pod, shell::rename(&from, &to)).await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("move", &from, &result));
        }
        info!(session_id = %session_id, from = %from, to = %to, "Entry moved");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Archives
    // ------------------------------------------------------------------

    /// Pack `path` into `<parent>/<name>.tar.gz`. Returns the archive path.
    pub async fn archive_file(&self, session_id: &SessionId, path: &str) -> Result<String> {
        let session = self.validate_and_get_session(session_id).await?;
        let path = self.canonical(path)?;
        if path == "/" {
            return Err(PodFileError::InvalidPath("cannot archive the root directory".to_string()));
        }

        let parent = parent_dir(&path);
        let name = base_name(&path);
        let archive = join(parent, &format!("{}.tar.gz", name));
        self.create_tarball(&session, parent, &archive, &[name]).await?;
        Ok(archive)
    }

    /// Pack siblings of one directory into `<parent>/<archive_name>`.
    pub async fn archive_multiple(
        &self,
        session_id: &SessionId,
        paths: &[String],
        archive_name: &str,
    ) -> Result<String> {
        let session = self.validate_and_get_session(session_id).await?;
        if paths.is_empty() {
            return Err(PodFileError::InvalidPath("no paths to archive".to_string()));
        }

        let canonical = paths
            .iter()
            .map(|p| self.canonical(p))
            .collect::<Result<Vec<_>>>()?;
        let parent = parent_dir(&canonical[0]);
        if let Some(outsider) = canonical.iter().find(|p| parent_dir(p) != parent || p.as_str() == "/") {
            return Err(PodFileError::InvalidPath(format!(
                "{} is not in {}; archived entries must share one parent directory",
                outsider, parent
            )));
        }

        let archive = join(parent, &archive_file_name(archive_name)?);
        let members: Vec<&str> = canonical.iter().map(|p| base_name(p)).collect();
        self.create_tarball(&session, parent, &archive, &members).await?;
        Ok(archive)
    }

    async fn create_tarball(
        &self,
        session: &FileEditSession,
        parent: &str,
        archive: &str,
        members: &[&str],
    ) -> Result<()> {
        let result = self
            .runner
            .run_script(&session.pod_ref(), shell::create_tarball(parent, archive, members))
            .await?;
        if !result.success() {
            return Err(PodFileError::from_failed_command("archive", parent, &result));
        }
        info!(
            session_id = %session.id,
            archive = %archive,
            members = members.len(),
            "Archive created"
        );
        Ok(())
    }

    /// Extract an archive locally and upload its tree under `destination`
    /// (default: the archive's directory). Returns the written file paths.
    pub async fn unarchive_file(
        &self,
        session_id: &SessionId,
        archive_path: &str,
        destination: Option<&str>,
    ) -> Result<Vec<String>> {
        let session = self.validate_and_get_session(session_id).await?;
        let archive_path = self.canonical(archive_path)?;
        let format = ArchiveFormat::from_path(&archive_path).ok_or_else(|| {
            PodFileError::InvalidPath(format!("unsupported archive format: {}", archive_path))
        })?;
        let destination = match destination {
            Some(dir) => self.canonical(dir)?,
            None => parent_dir(&archive_path).to_string(),
        };
        let pod = session.pod_ref();

        let data = self.read_remote(&pod, &archive_path).await?;
        let scratch = tempfile::tempdir()
            .map_err(|e| PodFileError::Local(format!("failed to create scratch directory: {}", e)))?;
        let scratch_path = scratch.path().to_path_buf();
        let exclude = base_name(&archive_path).to_string();
        let tree = tokio::task::spawn_blocking(move || {
            archive::extract_into(format, &data, &scratch_path, Some(exclude.as_str()))
        })
        .await
        .map_err(|e| PodFileError::Local(format!("extraction task failed: {}", e)))?
        .map_err(|e| PodFileError::Local(format!("failed to extract {}: {}", archive_path, e)))?;

        for dir in &tree.directories {
            let remote = join(&destination, dir);
            let result = self.runner.run_script(&pod, shell::make_dirs(&remote)).await?;
            if !result.success() {
                return Err(PodFileError::from_failed_command("create directory", &remote, &result));
            }
        }

        let mut written = Vec::with_capacity(tree.files.len());
        for relative in &tree.files {
            let content = tokio::fs::read(scratch.path().join(relative))
                .await
                .map_err(|e| PodFileError::Local(format!("failed to read extracted {}: {}", relative, e)))?;
            let remote = join(&destination, relative);
            self.write_remote(&session, &remote, &content).await?;
            written.push(remote);
        }

        info!(
            session_id = %session_id,
            archive = %archive_path,
            destination = %destination,
            files = written.len(),
            directories = tree.directories.len(),
            "Archive extracted"
        );
        Ok(written)
    }

    // ------------------------------------------------------------------
    // Bulk transfer
    // ------------------------------------------------------------------

    /// Write every file under `base_path`. Stops at the first failure.
    pub async fn upload_files(
        &self,
        session_id: &SessionId,
        files: &[UploadFile],
        base_path: &str,
    ) -> Result<Vec<String>> {
        let session = self.validate_and_get_session(session_id).await?;
        if files.is_empty() {
            return Err(PodFileError::InvalidPath("no files to upload".to_string()));
        }
        let base = self.canonical(base_path)?;

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let relative = self
                .sanitizer
                .relative(&file.relative_path)
                .map_err(|e| PodFileError::InvalidPath(e.to_string()))?;
            let remote = join(&base, &relative);
            self.write_remote(&session, &remote, &file.content).await?;
            written.push(remote);
        }
        Ok(written)
    }

    /// Zip of the readable files among `paths`, named by basename.
    /// Unreadable entries are logged and left out.
    pub async fn download_multiple(&self, session_id: &SessionId, paths: &[String]) -> Result<Vec<u8>> {
        let session = self.validate_and_get_session(session_id).await?;
        if paths.is_empty() {
            return Err(PodFileError::InvalidPath("no paths to download".to_string()));
        }
        let pod = session.pod_ref();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = match self.canonical(path) {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping invalid path in bulk download");
                    continue;
                }
            };
            match self.read_remote(&pod, &path).await {
                Ok(content) => files.push((base_name(&path).to_string(), content)),
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable file in bulk download"),
            }
        }

        let included = files.len();
        let bundle = tokio::task::spawn_blocking(move || {
            let mut builder = ZipBuilder::new();
            for (name, content) in &files {
                builder.add(name, content)?;
            }
            builder.finish()
        })
        .await
        .map_err(|e| PodFileError::Local(format!("zip task failed: {}", e)))?
        .map_err(|e| PodFileError::Local(format!("failed to build zip: {}", e)))?;

        info!(
            session_id = %session_id,
            requested = paths.len(),
            included,
            bytes = bundle.len(),
            "Bulk download prepared"
        );
        Ok(bundle)
    }
}

/// Group probe candidates so that no single `file` command line exceeds
/// [`MIME_BATCH_ARG_BUDGET`].
fn mime_batches(entries: &[FileMetadata], candidates: &[usize]) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut used = 0;
    for &i in candidates {
        let cost = entries[i].path.len() + 3;
        if !current.is_empty() && used + cost > MIME_BATCH_ARG_BUDGET {
            batches.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(i);
        used += cost;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn archive_file_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(PodFileError::InvalidPath(format!("invalid archive name: '{}'", name)));
    }
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.tar.gz", name))
    }
}

/// Remote upload temp file, removed on every exit path.
///
/// Normal paths call [`RemoteTempFile::release`]. If the owning future is
/// dropped mid-transfer, `Drop` spawns the removal on the current runtime.
struct RemoteTempFile {
    runner: CommandRunner,
    pod: PodRef,
    path: String,
    released: bool,
}

impl RemoteTempFile {
    fn new(runner: CommandRunner, pod: PodRef, path: String) -> Self {
        Self {
            runner,
            pod,
            path,
            released: false,
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn release(mut self) {
        self.released = true;
        remove_temp_file(&self.runner, &self.pod, &self.path).await;
    }
}

impl Drop for RemoteTempFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runner = self.runner.clone();
                let pod = self.pod.clone();
                handle.spawn(async move {
                    remove_temp_file(&runner, &pod, &path).await;
                });
            }
            Err(_) => warn!(path = %path, "No runtime available to remove remote temp file"),
        }
    }
}

async fn remove_temp_file(runner: &CommandRunner, pod: &PodRef, path: &str) {
    match runner.run_script(pod, transfer::cleanup_command(path)).await {
        Ok(result) if result.success() => debug!(pod = %pod, path = %path, "Removed remote temp file"),
        Ok(result) => warn!(
            pod = %pod,
            path = %path,
            exit_code = result.exit_code,
            stderr = %result.stderr.trim(),
            "Failed to remove remote temp file"
        ),
        Err(e) => warn!(pod = %pod, path = %path, error = %e, "Failed to remove remote temp file"),
    }
}
