// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Manifest export command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kubedump_core::application::ManifestExporter;
use kubedump_core::domain::config::KubedumpConfig;

use super::{connect, load_config, shutdown_token};

#[derive(Args, Debug, Default)]
pub struct ManifestsArgs {
    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only export objects in these namespaces
    #[arg(short = 'n', long = "namespace", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Skip objects in these namespaces
    #[arg(short = 'N', long = "exclude-namespace", value_delimiter = ',')]
    pub exclude_namespaces: Vec<String>,

    /// Only export these resources (plural names, e.g. deployments)
    #[arg(short = 'r', long = "resource", value_delimiter = ',')]
    pub resources: Vec<String>,

    /// Skip these resources (replaces the default exclusions)
    #[arg(short = 'R', long = "exclude-resource", value_delimiter = ',')]
    pub exclude_resources: Vec<String>,

    /// File name template relative to the output directory
    #[arg(long, value_name = "TEMPLATE")]
    pub template: Option<String>,

    /// Skip cluster-scoped resources
    #[arg(long)]
    pub no_cluster_scoped: bool,

    /// List the files that would be written
    #[arg(long)]
    pub dry_run: bool,
}

impl ManifestsArgs {
    pub fn apply(self, config: &mut KubedumpConfig) {
        if let Some(output) = self.output {
            config.output = output;
        }
        let manifests = &mut config.manifests;
        if !self.namespaces.is_empty() {
            manifests.namespaces = self.namespaces;
        }
        if !self.exclude_namespaces.is_empty() {
            manifests.exclude_namespaces = self.exclude_namespaces;
        }
        if !self.resources.is_empty() {
            manifests.resources = self.resources;
        }
        if !self.exclude_resources.is_empty() {
            manifests.exclude_resources = self.exclude_resources;
        }
        if let Some(template) = self.template {
            manifests.template = template;
        }
        manifests.no_cluster_scoped |= self.no_cluster_scoped;
        manifests.dry_run |= self.dry_run;
    }
}

pub async fn execute(args: ManifestsArgs, config_path: Option<PathBuf>, kubeconfig: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path, kubeconfig)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let cluster = connect(&config).await?;
    let exporter = ManifestExporter::new(cluster, config.output.clone(), &config.manifests);
    let report = exporter
        .export(&shutdown_token())
        .await
        .context("Manifest export failed")?;

    println!();
    if config.manifests.dry_run {
        for path in &report.written {
            println!("  {} {}", "•".cyan(), path.display());
        }
        println!();
        println!(
            "{}",
            format!("Dry run: {} manifest(s) would be written", report.written.len()).bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "✓ {} manifest(s) written to {}",
                report.written.len(),
                config.output.display()
            )
            .green()
            .bold()
        );
    }

    for (resource, error) in &report.failed_types {
        println!("  {} {} {}", "!".yellow(), resource, error.dimmed());
    }

    Ok(())
}
