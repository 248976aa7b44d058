// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show-config, validate-config, init-config

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use podfs_core::domain::bridge_config::BridgeConfigManifest;

pub async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = BridgeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PODFS_CONFIG_PATH: {}",
            std::env::var("PODFS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./podfs-config.yaml");
        println!("  4. ~/.podfs/config.yaml");
        println!("  5. /etc/podfs/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Transport:".bold());
    println!("  Backend: {:?}", config.spec.transport.backend);
    println!(
        "  Docker socket: {}",
        config
            .spec
            .transport
            .docker_socket_path
            .as_deref()
            .unwrap_or("(auto-detect)")
    );
    println!("  Default container: {}", config.spec.transport.default_container);
    println!();

    let transfer = &config.spec.transfer;
    println!("{}", "Transfer:".bold());
    println!("  Mode: {:?}", transfer.mode);
    println!("  Chunk size: {} bytes", transfer.chunk_size);
    println!("  Stdin slice size: {} bytes", transfer.stdin_slice_size);
    println!("  Temp dir: {}", transfer.temp_dir);
    println!("  Text detection limit: {} bytes", transfer.text_detection_limit);
    println!();

    println!("{}", "Session:".bold());
    println!("  Idle timeout: {}s", config.spec.session.idle_timeout_secs);
    println!("  Freshness window: {}s", config.spec.session.freshness_window_secs);
    println!("  Reap interval: {}s", config.spec.session.reap_interval_secs);
    println!();

    Ok(())
}

pub async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BridgeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

pub async fn generate(output: PathBuf) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists; refusing to overwrite", output.display());
    }

    BridgeConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
