// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod archive;
pub mod docker_exec;
pub mod event_bus;
pub mod local_exec;
pub mod session_registry;

pub use docker_exec::DockerExecTransport;
pub use event_bus::TransferEventBus;
pub use local_exec::LocalExecTransport;
pub use session_registry::InMemorySessionManager;
