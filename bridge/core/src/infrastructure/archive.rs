// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local archive handling.
//!
//! Archives are never unpacked inside the pod. The engine reads the archive
//! bytes over the exec channel, unpacks them here into a scratch directory
//! and re-uploads the resulting tree. Bulk downloads are packed into an
//! in-memory zip by [`ZipBuilder`].
//!
//! Everything in this module is blocking; callers run it on
//! `tokio::task::spawn_blocking`.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to walk extracted tree: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

/// Relative paths (always `/`-separated) found under an extraction root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Unpack `data` into `dir` and report what landed there.
///
/// Entries that would escape `dir` are skipped. Only regular files and
/// directories are reported; links and special files are left out. A
/// top-level entry named `exclude` (the archive itself, when it was packed
/// from inside its own directory) is dropped.
pub fn extract_into(
    format: ArchiveFormat,
    data: &[u8],
    dir: &Path,
    exclude: Option<&str>,
) -> Result<ExtractedTree, ArchiveError> {
    match format {
        ArchiveFormat::Tar => unpack_tar(tar::Archive::new(Cursor::new(data)), dir)?,
        ArchiveFormat::TarGz => unpack_tar(tar::Archive::new(GzDecoder::new(Cursor::new(data))), dir)?,
        ArchiveFormat::Zip => unpack_zip(data, dir)?,
    }
    collect_tree(dir, exclude)
}

fn unpack_tar<R: Read>(mut archive: tar::Archive<R>, dir: &Path) -> Result<(), ArchiveError> {
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        // unpack_in refuses paths with `..` or absolute roots.
        if !entry.unpack_in(dir)? {
            warn!(entry = %path, "Skipping archive entry outside extraction root");
        }
    }
    Ok(())
}

fn unpack_zip(data: &[u8], dir: &Path) -> Result<(), ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = %file.name(), "Skipping zip entry outside extraction root");
            continue;
        };
        let target = dir.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

fn collect_tree(dir: &Path, exclude: Option<&str>) -> Result<ExtractedTree, ArchiveError> {
    let mut tree = ExtractedTree::default();

    for entry in WalkDir::new(dir).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = relative_path(dir, entry.path());
        if entry.depth() == 1 && exclude == Some(relative.as_str()) {
            debug!(entry = %relative, "Skipping archive member matching the archive itself");
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tree.directories.push(relative);
        } else if file_type.is_file() {
            tree.files.push(relative);
        } else {
            warn!(entry = %relative, "Skipping non-regular archive member");
        }
    }
    Ok(tree)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory zip writer for bulk downloads. Entry names are flat; a
/// repeated name gets a ` (n)` suffix before its extension.
pub struct ZipBuilder {
    writer: zip::ZipWriter<Cursor<Vec<u8>>>,
    used_names: HashSet<String>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            writer: zip::ZipWriter::new(Cursor::new(Vec::new())),
            used_names: HashSet::new(),
        }
    }

    /// Add one file. Returns the entry name actually used.
    pub fn add(&mut self, name: &str, content: &[u8]) -> Result<String, ArchiveError> {
        let entry_name = self.unique_name(name);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        self.writer.start_file(entry_name.clone(), options)?;
        self.writer.write_all(content)?;
        Ok(entry_name)
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ArchiveError> {
        let cursor = self.writer.finish()?;
        Ok(cursor.into_inner())
    }

    fn unique_name(&mut self, name: &str) -> String {
        let name = if name.is_empty() { "file" } else { name };
        if self.used_names.insert(name.to_string()) {
            return name.to_string();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
            _ => (name, ""),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for ZipBuilder {
    fn default() -> Self {
        Self::new()
    }
}
