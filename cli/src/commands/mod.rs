// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the PodFS CLI

pub mod config;
pub mod files;
pub mod progress;

pub use self::files::FileCommand;
