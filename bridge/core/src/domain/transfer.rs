// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Chunked Binary Codec
//!
//! The exec channel only reliably carries text, and argv length is bounded.
//! Writes are therefore base64-encoded in fixed-size raw slices, appended to
//! a remote temp file one command at a time and decoded in place at the end.
//! Reads are the mirror image in a single command: stdout is not subject to
//! the argv ceiling.
//!
//! ```text
//! : > tmp                      truncate
//! printf '%s' '<b64 #1>' >> tmp
//! ...
//! printf '%s' '<b64 #n>' >> tmp
//! base64 -d tmp > target       decode
//! rm -f -- tmp                 always
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::shell::quote;

/// Raw bytes per slice. 30 000 bytes encode to 40 000 characters, well
/// below common `ARG_MAX` limits once quoting is added.
pub const DEFAULT_CHUNK_SIZE: usize = 30_000;

/// Largest accepted chunk. Its base64 slice (120 000 characters) plus the
/// append command around it must fit one argv string, which Linux caps at
/// `MAX_ARG_STRLEN` (131 072 bytes).
pub const MAX_CHUNK_SIZE: usize = 90_000;

/// Longest accepted temp directory; the quoted temp path shares the same
/// argv string as the slice.
pub const MAX_TEMP_DIR_LEN: usize = 1024;

/// How encoded slices reach the remote temp file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Slice travels inside the command line (`printf '%s' '<b64>' >> tmp`).
    #[default]
    Argv,
    /// Slice is streamed through stdin into `cat >> tmp`.
    Stdin,
}

impl std::str::FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "argv" => Ok(TransferMode::Argv),
            "stdin" => Ok(TransferMode::Stdin),
            other => Err(format!("unknown transfer mode '{}'", other)),
        }
    }
}

/// Base64 slices for one write. Always at least one slice, so an empty
/// payload still reports 1/1 progress.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    chunks: Vec<String>,
}

impl ChunkPlan {
    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(content: &[u8], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        let mut chunks: Vec<String> = content
            .chunks(chunk_size)
            .map(|slice| BASE64.encode(slice))
            .collect();
        if chunks.is_empty() {
            chunks.push(String::new());
        }
        Self { chunks }
    }

    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    /// `(1-based index, encoded slice)` in send order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i + 1, chunk.as_str()))
    }
}

/// Integer completion percentage, clamped to 100.
pub fn percent_complete(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) * 100) / total) as u8
}

/// Unique remote temp path: millisecond timestamp plus random suffix.
pub fn temp_upload_path(temp_dir: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/.podfs-upload-{}-{}.b64",
        temp_dir.trim_end_matches('/'),
        millis,
        &suffix[..12]
    )
}

pub fn truncate_command(tmp: &str) -> String {
    format!(": > {}", quote(tmp))
}

pub fn append_command(tmp: &str, encoded: &str) -> String {
    format!("printf '%s' {} >> {}", quote(encoded), quote(tmp))
}

pub fn stdin_append_command(tmp: &str) -> String {
    format!("cat >> {}", quote(tmp))
}

pub fn decode_command(tmp: &str, target: &str) -> String {
    format!("base64 -d {} > {}", quote(tmp), quote(target))
}

pub fn cleanup_command(tmp: &str) -> String {
    format!("rm -f -- {}", quote(tmp))
}

pub fn read_command(path: &str) -> String {
    format!("base64 {}", quote(path))
}

/// Decode `base64` stdout, ignoring the tool's line wrapping.
pub fn decode_read_output(stdout: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = stdout.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_counts_chunks_at_boundaries() {
        let size = 10;
        assert_eq!(ChunkPlan::new(&[7u8; 20], size).total(), 2);
        assert_eq!(ChunkPlan::new(&[7u8; 21], size).total(), 3);
        assert_eq!(ChunkPlan::new(&[7u8; 19], size).total(), 2);
        assert_eq!(ChunkPlan::new(&[7u8; 1], size).total(), 1);
    }

    #[test]
    fn test_empty_payload_has_one_empty_chunk() {
        let plan = ChunkPlan::new(&[], DEFAULT_CHUNK_SIZE);
        let chunks: Vec<_> = plan.iter().collect();
        assert_eq!(chunks, vec![(1, "")]);
    }

    #[test]
    fn test_chunks_concatenate_back_to_payload() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let plan = ChunkPlan::new(&payload, 300);
        let mut decoded = Vec::new();
        for (_, chunk) in plan.iter() {
            decoded.extend(BASE64.decode(chunk).unwrap());
        }
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_largest_append_command_fits_one_argv_string() {
        const MAX_ARG_STRLEN: usize = 131_072;
        let payload = vec![0xffu8; MAX_CHUNK_SIZE * 2];
        let plan = ChunkPlan::new(&payload, usize::MAX);
        assert_eq!(plan.total(), 2);

        // Worst case temp path: every byte a quote, each expanding to '\''.
        let temp_dir = format!("/{}", "'".repeat(MAX_TEMP_DIR_LEN - 1));
        let tmp = temp_upload_path(&temp_dir);
        let (_, slice) = plan.iter().next().unwrap();
        let script = append_command(&tmp, slice);
        assert!(script.len() < MAX_ARG_STRLEN, "{} bytes", script.len());
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(1, 4), 25);
        assert_eq!(percent_complete(4, 4), 100);
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(0, 0), 100);
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let a = temp_upload_path("/tmp/");
        let b = temp_upload_path("/tmp");
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/.podfs-upload-"));
        assert!(a.ends_with(".b64"));
    }

    #[test]
    fn test_decode_read_output_ignores_wrapping() {
        let encoded = BASE64.encode(vec![0u8; 120]);
        let wrapped = format!("{}\n{}\n", &encoded[..76], &encoded[76..]);
        assert_eq!(decode_read_output(wrapped.as_bytes()).unwrap(), vec![0u8; 120]);
        assert!(decode_read_output(b"").unwrap().is_empty());
        assert!(decode_read_output(b"not base64!").is_err());
        assert!(decode_read_output(&[b'A', b'A', 0xff, b'A']).is_err());
    }

    #[test]
    fn test_write_commands() {
        assert_eq!(truncate_command("/tmp/t"), ": > '/tmp/t'");
        assert_eq!(append_command("/tmp/t", "QUJD"), "printf '%s' 'QUJD' >> '/tmp/t'");
        assert_eq!(decode_command("/tmp/t", "/d/f"), "base64 -d '/tmp/t' > '/d/f'");
        assert_eq!(cleanup_command("/tmp/t"), "rm -f -- '/tmp/t'");
        assert_eq!(stdin_append_command("/tmp/t"), "cat >> '/tmp/t'");
    }

    #[test]
    fn test_transfer_mode_parse() {
        assert_eq!("STDIN".parse::<TransferMode>().unwrap(), TransferMode::Stdin);
        assert_eq!("argv".parse::<TransferMode>().unwrap(), TransferMode::Argv);
        assert!("pipe".parse::<TransferMode>().is_err());
    }
}
