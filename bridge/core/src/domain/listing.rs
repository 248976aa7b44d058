// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Metadata Parser
//!
//! Turns `stat -c` output produced by [`crate::domain::shell`] into
//! [`FileMetadata`], and decides which entries are worth a MIME probe.
//!
//! Listing lines are `name|size|mtime|type|mode`. The four trailing fields
//! are split from the right, so a `|` inside a file name survives. Lines
//! with fewer than five fields are skipped.

use crate::domain::path_sanitizer::base_name;
use crate::domain::pod_files::{FileMetadata, FileType};

/// Files at or above this size are treated as binary without probing.
pub const TEXT_DETECTION_LIMIT: u64 = 100 * 1024;

const PERMISSION_TRIPLETS: [&str; 8] = ["---", "--x", "-w-", "-wx", "r--", "r-x", "rw-", "rwx"];

/// MIME types (or prefixes ending in `/`) considered readable text.
const TEXT_MIME_TYPES: &[&str] = &[
    "text/",
    "application/json",
    "application/ld+json",
    "application/xml",
    "image/svg+xml",
    "application/javascript",
    "application/x-javascript",
    "application/ecmascript",
    "application/typescript",
    "application/yaml",
    "application/x-yaml",
    "application/toml",
    "application/x-toml",
    "application/x-sh",
    "application/x-shellscript",
    "application/x-python",
    "application/x-python-code",
    "application/x-ruby",
    "application/x-perl",
    "application/x-php",
    "application/x-httpd-php",
    "application/sql",
    "application/x-sql",
    "application/x-ndjson",
    "application/csv",
    "application/x-empty",
    "inode/x-empty",
    "application/octet-stream",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "jsonc", "json5", "ndjson",
    "yaml", "yml", "toml", "ini", "cfg", "conf", "config", "properties", "env", "xml", "html",
    "htm", "css", "scss", "sass", "less", "svg", "js", "mjs", "cjs", "jsx", "ts", "tsx", "vue",
    "svelte", "py", "rb", "pl", "php", "lua", "go", "rs", "java", "kt", "kts", "scala",
    "groovy", "gradle", "c", "h", "cc", "cpp", "hpp", "cs", "swift", "dart", "sh", "bash",
    "zsh", "fish", "ps1", "bat", "cmd", "sql", "graphql", "proto", "tf", "hcl", "lock",
    "gitignore", "dockerignore", "editorconfig", "mcmeta", "secret",
];

/// File names without an extension that are known to be text.
const TEXT_FILE_NAMES: &[&str] = &[
    "dockerfile", "makefile", "procfile", "readme", "license", "changelog", "eula",
];

/// Map the `%F` type word to a [`FileType`].
pub fn file_type_from_word(word: &str) -> FileType {
    let word = word.to_ascii_lowercase();
    if word.contains("directory") {
        FileType::Directory
    } else if word.contains("symbolic link") || word.contains("symlink") {
        FileType::Symlink
    } else {
        FileType::Regular
    }
}

/// Render an octal mode such as `644` or `2755` as `-rw-r--r--`.
/// Only the last three digits contribute; invalid digits render as `---`.
pub fn format_permissions(file_type: FileType, octal: &str) -> String {
    let tail: Vec<char> = octal.trim().chars().rev().take(3).collect();
    let mut rendered = String::with_capacity(10);
    rendered.push(file_type.mode_char());
    // Left-pad short modes ("44" -> "044").
    let padded = std::iter::repeat('0')
        .take(3 - tail.len())
        .chain(tail.into_iter().rev());
    for digit in padded {
        let triplet = digit
            .to_digit(8)
            .map(|d| PERMISSION_TRIPLETS[d as usize])
            .unwrap_or("---");
        rendered.push_str(triplet);
    }
    rendered
}

/// Parse one listing line. `None` for malformed lines.
pub fn parse_listing_line(line: &str) -> Option<FileMetadata> {
    let line = line.trim_end_matches('\r');
    let fields: Vec<&str> = line.rsplitn(5, '|').collect();
    if fields.len() < 5 {
        return None;
    }
    // rsplitn yields fields right to left.
    let (mode, type_word, mtime, size, path) = (fields[0], fields[1], fields[2], fields[3], fields[4]);
    if path.is_empty() {
        return None;
    }

    let file_type = file_type_from_word(type_word);
    let size: u64 = size.trim().parse().ok()?;
    let mtime_secs: i64 = mtime.trim().parse().ok()?;

    Some(FileMetadata {
        name: base_name(path).to_string(),
        file_type,
        size,
        modify_time: mtime_secs * 1000,
        path: path.to_string(),
        permissions: format_permissions(file_type, mode),
        is_text: file_type == FileType::Regular && size == 0,
    })
}

/// Parse the full output of a listing command, skipping malformed lines.
pub fn parse_listing(output: &str) -> Vec<FileMetadata> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_listing_line(line);
            if parsed.is_none() {
                tracing::debug!(line = %line, "Skipping malformed listing line");
            }
            parsed
        })
        .collect()
}

/// Parse `size mtime mode type words` for `path`.
pub fn parse_stat(path: &str, output: &str) -> Option<FileMetadata> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut fields = line.split_whitespace();
    let size: u64 = fields.next()?.parse().ok()?;
    let mtime_secs: i64 = fields.next()?.parse().ok()?;
    let mode = fields.next()?;
    let type_words: Vec<&str> = fields.collect();
    if type_words.is_empty() {
        return None;
    }
    let file_type = file_type_from_word(&type_words.join(" "));

    Some(FileMetadata {
        name: base_name(path).to_string(),
        file_type,
        size,
        modify_time: mtime_secs * 1000,
        path: path.to_string(),
        permissions: format_permissions(file_type, mode),
        is_text: file_type == FileType::Regular && size == 0,
    })
}

/// Only non-empty regular files below `limit` are probed.
pub fn needs_mime_probe(meta: &FileMetadata, limit: u64) -> bool {
    meta.file_type == FileType::Regular && meta.size > 0 && meta.size < limit
}

pub fn is_text_mime(mime: &str) -> bool {
    let mime = mime.trim().to_ascii_lowercase();
    let essence = mime.split(';').next().unwrap_or("").trim();
    if essence.is_empty() {
        return false;
    }
    TEXT_MIME_TYPES.iter().any(|known| {
        if known.ends_with('/') {
            essence.starts_with(known)
        } else {
            essence == *known
        }
    })
}

/// Fallback heuristic when MIME detection is unavailable.
pub fn is_text_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if TEXT_FILE_NAMES.contains(&lower.as_str()) {
        return true;
    }
    match lower.rsplit_once('.') {
        Some((_, ext)) => TEXT_EXTENSIONS.contains(&ext),
        None => false,
    }
}
