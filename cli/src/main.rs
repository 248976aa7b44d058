// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # PodFS CLI
//!
//! The `podfs` binary browses and edits files inside a running pod using
//! nothing but the container exec channel.
//!
//! Every file command opens one in-memory session against the target pod,
//! activates it, runs a single operation and exits.
//!
//! ## Commands
//!
//! - `podfs ls|stat|cat|get|put|rm|mkdir|rmdir|mv` - File operations
//! - `podfs archive|unarchive|zip` - Archive and bulk transfer
//! - `podfs validate-config|show-config|init-config` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use podfs_bridge::commands::{self, FileCommand};
use podfs_bridge::embedded::PodTarget;
use podfs_core::domain::pod_files::PodFileError;

/// PodFS - file access to pod volumes over container exec
#[derive(Parser)]
#[command(name = "podfs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PODFS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PODFS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Namespace of the target pod
    #[arg(short, long, global = true, env = "PODFS_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Target pod name
    #[arg(short, long, global = true, env = "PODFS_POD")]
    pod: Option<String>,

    /// Container inside the pod (default: spec.transport.default_container)
    #[arg(long, global = true, env = "PODFS_CONTAINER")]
    container: Option<String>,

    /// Print machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    File(FileCommand),

    /// Validate configuration file
    #[command(name = "validate-config")]
    ValidateConfig {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Show the effective configuration
    #[command(name = "show-config")]
    ShowConfig {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Write a default configuration file
    #[command(name = "init-config")]
    InitConfig {
        #[arg(short, long, default_value = "./podfs-config.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::File(command)) => {
            let pod = cli
                .pod
                .context("No target pod. Pass --pod or set PODFS_POD")?;
            let target = PodTarget {
                namespace: cli.namespace,
                pod,
                container: cli.container,
            };
            let result = commands::files::handle_command(command, cli.config, target, cli.json).await;
            if cli.json {
                if let Err(e) = &result {
                    print_json_error(e)?;
                    std::process::exit(1);
                }
            }
            result
        }
        Some(Commands::ValidateConfig { file }) => {
            commands::config::validate(file.or(cli.config)).await
        }
        Some(Commands::ShowConfig { paths }) => commands::config::show(cli.config, paths).await,
        Some(Commands::InitConfig { output }) => commands::config::generate(output).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Error object on stdout so scripted callers can branch on `kind`.
fn print_json_error(error: &anyhow::Error) -> Result<()> {
    let kind = error
        .downcast_ref::<PodFileError>()
        .map(|e| serde_json::to_value(e.kind()))
        .transpose()?;
    let body = serde_json::json!({
        "error": {
            "kind": kind,
            "message": format!("{:#}", error),
        }
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
