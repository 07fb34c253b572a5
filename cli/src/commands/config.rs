// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use kubedump_core::domain::config::{KubedumpConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./kubedump.yaml)
        #[arg(short, long, default_value = "./kubedump.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = KubedumpConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./kubedump.yaml");
        println!("  4. ~/.kubedump/config.yaml");
        println!("  5. /etc/kubedump/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Cluster:".bold());
    match &config.kubeconfig {
        Some(path) => println!("  Kubeconfig: {}", path.display()),
        None => println!("  Kubeconfig: {}", "(inferred)".dimmed()),
    }
    println!("  Output: {}", config.output.display());
    println!();

    println!("{}", "Volumes:".bold());
    println!("  Namespaces: {}", list_or_all(&config.volumes.namespaces));
    println!("  Excluded namespaces: {}", list_or_none(&config.volumes.exclude_namespaces));
    println!("  Targets: {}", list_or_all(&config.volumes.targets));
    println!("  Concurrency: {}", config.volumes.concurrency);
    println!("  Ignore unbound: {}", config.volumes.ignore_unbound);
    println!();

    println!("{}", "Agent:".bold());
    println!("  Image: {}", config.agent.image);
    println!("  Ready timeout: {}s", config.agent.ready_timeout.as_secs());
    println!("  Poll interval: {}ms", config.agent.poll_interval.as_millis());
    println!();

    println!("{}", "Manifests:".bold());
    println!("  Template: {}", config.manifests.template);
    println!("  Resources: {}", list_or_all(&config.manifests.resources));
    println!("  Excluded resources: {}", list_or_none(&config.manifests.exclude_resources));
    println!("  Cluster-scoped: {}", !config.manifests.no_cluster_scoped);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = KubedumpConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    KubedumpConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn list_or_all(items: &[String]) -> String {
    if items.is_empty() {
        "(all)".to_string()
    } else {
        items.join(", ")
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
