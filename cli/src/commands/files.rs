// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote file commands
//!
//! Commands: ls, stat, cat, get, put, rm, mkdir, rmdir, mv, archive, unarchive, zip

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

use podfs_core::domain::pod_files::{FileMetadata, FileType, UploadFile};

use super::progress::ProgressReporter;
use crate::embedded::{EmbeddedBridge, PodTarget};

#[derive(Subcommand)]
pub enum FileCommand {
    /// List a remote directory
    Ls {
        #[arg(value_name = "DIR", default_value = "/")]
        dir: String,

        /// Walk the whole tree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show metadata for one remote path
    Stat {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Print a remote file to stdout
    Cat {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Download a remote file
    Get {
        #[arg(value_name = "REMOTE")]
        remote: String,

        /// Local destination (default: basename in the working directory)
        #[arg(value_name = "LOCAL")]
        local: Option<PathBuf>,
    },

    /// Upload a local file or directory tree
    Put {
        #[arg(value_name = "LOCAL")]
        local: PathBuf,

        /// Remote file path, or directory when LOCAL is a directory or REMOTE ends with '/'
        #[arg(value_name = "REMOTE")]
        remote: String,
    },

    /// Delete a remote file
    Rm {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Create a remote directory and its parents
    Mkdir {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Delete a remote directory recursively
    Rmdir {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Move or rename a remote entry
    Mv {
        #[arg(value_name = "FROM")]
        from: String,

        #[arg(value_name = "TO")]
        to: String,
    },

    /// Pack remote entries into a .tar.gz next to them
    Archive {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,

        /// Archive name (required when packing more than one entry)
        #[arg(long)]
        name: Option<String>,
    },

    /// Extract a remote .tar, .tar.gz, .tgz or .zip archive
    Unarchive {
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Destination directory (default: the archive's directory)
        #[arg(short, long)]
        dest: Option<String>,
    },

    /// Download several remote files as one zip
    Zip {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,

        #[arg(short, long, default_value = "podfs-download.zip")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: FileCommand,
    config_path: Option<PathBuf>,
    target: PodTarget,
    json_output: bool,
) -> Result<()> {
    let bridge = EmbeddedBridge::connect(config_path, target).await?;
    let result = run(&bridge, command, json_output).await;
    bridge.close();
    result
}

async fn run(bridge: &EmbeddedBridge, command: FileCommand, json_output: bool) -> Result<()> {
    let ops = bridge.operations();
    let session = bridge.session_id();

    match command {
        FileCommand::Ls { dir, recursive } => {
            let entries = if recursive {
                ops.list_files_recursive(session, &dir).await?
            } else {
                ops.list_files(session, &dir).await?
            };
            if json_output {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_listing(&entries, recursive);
            }
        }

        FileCommand::Stat { path } => {
            let metadata = ops.stat_file(session, &path).await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                print_metadata(&metadata);
            }
        }

        FileCommand::Cat { path } => {
            let content = ops.read_file(session, &path).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content).context("Failed to write to stdout")?;
            stdout.flush()?;
        }

        FileCommand::Get { remote, local } => {
            let file = ops.download_file(session, &remote).await?;
            let local = match local {
                Some(path) if path.is_dir() => path.join(&file.name),
                Some(path) => path,
                None => PathBuf::from(&file.name),
            };
            tokio::fs::write(&local, &file.content)
                .await
                .with_context(|| format!("Failed to write {}", local.display()))?;
            report(
                json_output,
                json!({ "path": file.path, "local": local, "bytes": file.content.len() }),
                format!("✓ Downloaded {} → {} ({} bytes)", file.path, local.display(), file.content.len()),
            )?;
        }

        FileCommand::Put { local, remote } => {
            let written = if local.is_dir() {
                let files = collect_upload_tree(&local)?;
                let progress = ProgressReporter::start(bridge.event_bus(), session, json_output);
                let written = ops.upload_files(session, &files, &remote).await;
                progress.finish();
                written?
            } else {
                let content = tokio::fs::read(&local)
                    .await
                    .with_context(|| format!("Failed to read {}", local.display()))?;
                let remote = remote_file_path(&remote, &local);
                let progress = ProgressReporter::start(bridge.event_bus(), session, json_output);
                let result = ops.write_file(session, &remote, &content).await;
                progress.finish();
                result?;
                vec![remote]
            };
            report(
                json_output,
                json!({ "written": written }),
                format!("✓ Uploaded {} file(s)", written.len()),
            )?;
        }

        FileCommand::Rm { path } => {
            ops.delete_file(session, &path).await?;
            report(json_output, json!({ "deleted": path }), format!("✓ Deleted {}", path))?;
        }

        FileCommand::Mkdir { path } => {
            ops.create_directory(session, &path).await?;
            report(json_output, json!({ "created": path }), format!("✓ Created {}", path))?;
        }

        FileCommand::Rmdir { path } => {
            ops.delete_directory(session, &path).await?;
            report(json_output, json!({ "deleted": path }), format!("✓ Deleted {}", path))?;
        }

        FileCommand::Mv { from, to } => {
            ops.move_file(session, &from, &to).await?;
            report(
                json_output,
                json!({ "from": from, "to": to }),
                format!("✓ Moved {} → {}", from, to),
            )?;
        }

        FileCommand::Archive { paths, name } => {
            let archive = match (paths.as_slice(), name) {
                ([single], None) => ops.archive_file(session, single).await?,
                (_, Some(name)) => ops.archive_multiple(session, &paths, &name).await?,
                (_, None) => anyhow::bail!("--name is required when archiving more than one path"),
            };
            report(json_output, json!({ "archive": archive }), format!("✓ Created {}", archive))?;
        }

        FileCommand::Unarchive { archive, dest } => {
            let progress = ProgressReporter::start(bridge.event_bus(), session, json_output);
            let written = ops.unarchive_file(session, &archive, dest.as_deref()).await;
            progress.finish();
            let written = written?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&json!({ "written": written }))?);
            } else {
                println!("{}", format!("✓ Extracted {} file(s)", written.len()).green());
                for path in &written {
                    println!("  {}", path.dimmed());
                }
            }
        }

        FileCommand::Zip { paths, output } => {
            let bundle = ops.download_multiple(session, &paths).await?;
            tokio::fs::write(&output, &bundle)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            report(
                json_output,
                json!({ "output": output, "bytes": bundle.len() }),
                format!("✓ Wrote {} ({} bytes)", output.display(), bundle.len()),
            )?;
        }
    }

    Ok(())
}

fn report(json_output: bool, value: serde_json::Value, message: String) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", message.green());
    }
    Ok(())
}

fn print_listing(entries: &[FileMetadata], recursive: bool) {
    if entries.is_empty() {
        println!("{}", "(empty)".dimmed());
        return;
    }
    for entry in entries {
        let label = if recursive { &entry.path } else { &entry.name };
        let label = match entry.file_type {
            FileType::Directory => format!("{}/", label).blue().bold(),
            FileType::Symlink => label.cyan(),
            FileType::Regular if entry.is_text => label.normal(),
            FileType::Regular => label.dimmed(),
        };
        println!(
            "{} {:>10} {} {}",
            entry.permissions,
            entry.size,
            format_mtime(entry.modify_time).dimmed(),
            label
        );
    }
}

fn print_metadata(metadata: &FileMetadata) {
    println!("{}", metadata.path.bold());
    println!("  Type: {:?}", metadata.file_type);
    println!("  Size: {} bytes", metadata.size);
    println!("  Permissions: {}", metadata.permissions);
    println!("  Modified: {}", format_mtime(metadata.modify_time));
    println!("  Text: {}", if metadata.is_text { "yes" } else { "no" });
}

fn format_mtime(epoch_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// A remote path ending in '/' names a directory to upload into.
fn remote_file_path(remote: &str, local: &Path) -> String {
    match local.file_name().and_then(|n| n.to_str()) {
        Some(name) if remote.ends_with('/') => format!("{}{}", remote, name),
        _ => remote.to_string(),
    }
}

/// Regular files under `root` keyed by '/'-separated relative path.
fn collect_upload_tree(root: &Path) -> Result<Vec<UploadFile>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        files.push(UploadFile::new(relative, content));
    }
    if files.is_empty() {
        anyhow::bail!("{} contains no files", root.display());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_path_appends_name_for_directories() {
        let local = Path::new("/tmp/report.csv");
        assert_eq!(remote_file_path("/data/", local), "/data/report.csv");
        assert_eq!(remote_file_path("/data/out.csv", local), "/data/out.csv");
    }

    #[test]
    fn test_collect_upload_tree_uses_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("nested/deeper/b.bin"), [0u8, 1, 2]).unwrap();

        let files = collect_upload_tree(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "nested/deeper/b.bin"]);
        assert_eq!(files[1].content, vec![0u8, 1, 2]);
    }

    #[test]
    fn test_collect_upload_tree_rejects_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_upload_tree(dir.path()).is_err());
    }

    #[test]
    fn test_format_mtime() {
        assert_eq!(format_mtime(0), "1970-01-01 00:00");
    }
}
