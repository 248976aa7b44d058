// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: session model, exec transport contract, remote command
//! surface, transfer codec and metadata parsing. Nothing here performs I/O.

pub mod bridge_config;
pub mod events;
pub mod exec;
pub mod listing;
pub mod path_sanitizer;
pub mod pod_files;
pub mod session;
pub mod shell;
pub mod transfer;
