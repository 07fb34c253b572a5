// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # kubedump
//!
//! Backs up the contents of Kubernetes persistent volumes, and the manifests
//! of the objects in a cluster, to local files.
//!
//! ## Commands
//!
//! - `kubedump volumes [NAME...]` - Stream volume contents to `<output>/volumes`
//! - `kubedump manifests` - Export object manifests as YAML
//! - `kubedump config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, ManifestsArgs, VolumesArgs};

/// kubedump - Kubernetes volume and manifest backups
#[derive(Parser)]
#[command(name = "kubedump")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "KUBEDUMP_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Path to a kubeconfig file (default: KUBECONFIG, ~/.kube/config or in-cluster)
    #[arg(long, global = true, value_name = "FILE")]
    kubeconfig: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "KUBEDUMP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up persistent volume contents
    #[command(name = "volumes")]
    Volumes(VolumesArgs),

    /// Export object manifests
    #[command(name = "manifests")]
    Manifests(ManifestsArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Volumes(args)) => {
            commands::volumes::execute(args, cli.config, cli.kubeconfig).await
        }
        Some(Commands::Manifests(args)) => {
            commands::manifests::execute(args, cli.config, cli.kubeconfig).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
