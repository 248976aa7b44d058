// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Remote Path Sanitizer
//!
//! Every path the bridge places into a remote command goes through here
//! first. Paths are POSIX paths inside the container, independent of the
//! host platform, so this works on `&str` components rather than
//! `std::path`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Normalizes remote paths and rejects traversal

use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Path sanitizer domain service
///
/// # Guarantees
/// - Rejects relative paths, `..` components and NUL bytes
/// - Collapses `.` components and repeated separators
/// - Never returns a trailing slash except for `/` itself
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096, Linux PATH_MAX)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Canonicalize and validate an absolute remote path.
    ///
    /// # Examples
    /// ```
    /// use podfs_core::domain::path_sanitizer::PathSanitizer;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert_eq!(sanitizer.canonicalize("/data//world/./level.dat").unwrap(), "/data/world/level.dat");
    /// assert!(sanitizer.canonicalize("/data/../etc/passwd").is_err());
    /// ```
    pub fn canonicalize(&self, path: &str) -> Result<String, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }
        if path.contains('\0') {
            tracing::warn!(path = %path.escape_debug(), "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }
        if !path.starts_with('/') {
            return Err(PathSanitizerError::NotAbsolute(path.to_string()));
        }

        let mut parts: Vec<&str> = Vec::new();
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    tracing::warn!(
                        path = %path,
                        "Path traversal attempt detected: contains '..' component"
                    );
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
                part => parts.push(part),
            }
        }

        Ok(format!("/{}", parts.join("/")))
    }

    /// Validate a path relative to some base (bulk upload entries, archive
    /// members). Returns the normalized relative form.
    pub fn relative(&self, path: &str) -> Result<String, PathSanitizerError> {
        let trimmed = path.trim_start_matches('/');
        let absolute = self.canonicalize(&format!("/{}", trimmed))?;
        if absolute == "/" {
            return Err(PathSanitizerError::InvalidPath(format!(
                "empty relative path: '{}'",
                path
            )));
        }
        Ok(absolute[1..].to_string())
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parent directory of a canonical absolute path (`/` for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last component of a path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a canonical directory and a relative path.
pub fn join(dir: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if dir.ends_with('/') {
        format!("{}{}", dir, relative)
    } else {
        format!("{}/{}", dir, relative)
    }
}
