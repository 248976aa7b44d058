// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PodFS bridge core
//!
//! File operations against volumes that are only reachable through a
//! container exec channel.
//!
//! # Architecture
//!
//! - **domain:** value types, transport contract, command surface, codecs
//! - **application:** command runner and the file operations engine
//! - **infrastructure:** Docker/local transports, session registry, event bus, archives

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
