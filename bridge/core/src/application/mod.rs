// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod command_runner;
pub mod file_operations;

pub use command_runner::CommandRunner;
pub use file_operations::PodFileOperations;
