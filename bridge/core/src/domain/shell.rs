// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote command surface.
//!
//! Every command the bridge sends is a self-contained `sh -c` script built
//! here. Only flags understood by both GNU coreutils and BusyBox are used.
//! Callers pass canonical absolute paths; every interpolated value is
//! single-quoted with [`quote`].

/// `stat` layout for directory listings: `name|size|mtime|type|mode`.
pub const LIST_FORMAT: &str = "%n|%s|%Y|%F|%a";

/// `stat` layout for a single entry: `size mtime mode type words`.
pub const STAT_FORMAT: &str = "%s %Y %a %F";

/// Single-quote `value` for POSIX sh. Embedded single quotes become `'\''`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Wrap a script as an argv for `sh -c`.
pub fn sh(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into()]
}

fn dir_arg(dir: &str) -> String {
    // Trailing slash makes find descend into a symlinked directory.
    if dir.ends_with('/') {
        quote(dir)
    } else {
        quote(&format!("{}/", dir))
    }
}

pub fn list_directory(dir: &str) -> String {
    format!(
        "find {} -mindepth 1 -maxdepth 1 -exec stat -c {} {{}} +",
        dir_arg(dir),
        quote(LIST_FORMAT)
    )
}

pub fn list_directory_recursive(dir: &str) -> String {
    format!(
        "find {} -mindepth 1 -exec stat -c {} {{}} +",
        dir_arg(dir),
        quote(LIST_FORMAT)
    )
}

pub fn stat_entry(path: &str) -> String {
    format!("stat -c {} {}", quote(STAT_FORMAT), quote(path))
}

pub fn detect_mime<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let args: Vec<String> = paths.into_iter().map(quote).collect();
    format!("file -b --mime-type -- {}", args.join(" "))
}

pub fn make_dirs(path: &str) -> String {
    format!("mkdir -p {}", quote(path))
}

/// No `-f`: a missing file is reported as a failure.
pub fn remove_file(path: &str) -> String {
    format!("rm -- {}", quote(path))
}

pub fn remove_tree(path: &str) -> String {
    format!("rm -rf -- {}", quote(path))
}

pub fn rename(from: &str, to: &str) -> String {
    format!("mv -- {} {}", quote(from), quote(to))
}

/// Create a gzipped tarball from members of `parent`, named by basename.
pub fn create_tarball(parent: &str, archive: &str, members: &[&str]) -> String {
    let members: Vec<String> = members.iter().map(|m| quote(m)).collect();
    format!(
        "cd {} && tar -czf {} -- {}",
        quote(parent),
        quote(archive),
        members.join(" ")
    )
}
