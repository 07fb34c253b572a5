// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume backup command
//!
//! ```bash
//! # Back up every volume
//! kubedump volumes -o ./backup
//!
//! # Back up two volumes, one named by its claim
//! kubedump volumes pv-a pvc-x -t 2
//!
//! # Show what would be backed up
//! kubedump volumes -n prod --ignore-unbound --dry-run
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kubedump_core::application::run_backup;
use kubedump_core::domain::config::KubedumpConfig;
use kubedump_core::domain::download::{DownloadReport, TaskOutcome};

use super::{connect, format_bytes, load_config, shutdown_token};

#[derive(Args, Debug, Default)]
pub struct VolumesArgs {
    /// Volume or claim names to back up (default: all volumes)
    #[arg(value_name = "NAME")]
    pub targets: Vec<String>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only back up claims in these namespaces
    #[arg(short = 'n', long = "namespace", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Skip claims in these namespaces
    #[arg(short = 'N', long = "exclude-namespace", value_delimiter = ',')]
    pub exclude_namespaces: Vec<String>,

    /// Number of volumes downloaded in parallel
    #[arg(short = 't', long = "threads", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Skip volumes without an attachment and claims that are not bound
    #[arg(long)]
    pub ignore_unbound: bool,

    /// Resolve volumes and print the plan without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Image for the extraction agent pods
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Seconds to wait for an agent pod to start
    #[arg(long, value_name = "SECONDS")]
    pub ready_timeout: Option<u64>,
}

impl VolumesArgs {
    /// Command line values win over the configuration file.
    pub fn apply(self, config: &mut KubedumpConfig) {
        if let Some(output) = self.output {
            config.output = output;
        }
        if !self.targets.is_empty() {
            config.volumes.targets = self.targets;
        }
        if !self.namespaces.is_empty() {
            config.volumes.namespaces = self.namespaces;
        }
        if !self.exclude_namespaces.is_empty() {
            config.volumes.exclude_namespaces = self.exclude_namespaces;
        }
        if let Some(concurrency) = self.concurrency {
            config.volumes.concurrency = concurrency;
        }
        config.volumes.ignore_unbound |= self.ignore_unbound;
        config.volumes.dry_run |= self.dry_run;
        if let Some(image) = self.image {
            config.agent.image = image;
        }
        if let Some(secs) = self.ready_timeout {
            config.agent.ready_timeout = Duration::from_secs(secs);
        }
    }
}

pub async fn execute(args: VolumesArgs, config_path: Option<PathBuf>, kubeconfig: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path, kubeconfig)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let cluster = connect(&config).await?;
    let report = run_backup(cluster, &config, shutdown_token())
        .await
        .context("Volume backup failed")?;

    print_report(&report);

    if report.failed() > 0 {
        anyhow::bail!(
            "{} volume(s) failed: {}",
            report.failed(),
            report.failed_targets().join(", ")
        );
    }
    Ok(())
}

fn print_report(report: &DownloadReport) {
    println!();
    for result in &report.results {
        let label = match &result.volume {
            Some(volume) if volume != &result.target => format!("{} ({})", result.target, volume),
            _ => result.target.clone(),
        };
        match &result.outcome {
            TaskOutcome::Succeeded { bytes } => {
                println!("  {} {} {}", "✓".green(), label.bold(), format_bytes(*bytes).dimmed())
            }
            TaskOutcome::Planned => println!("  {} {}", "•".cyan(), label.bold()),
            TaskOutcome::Skipped(reason) => {
                println!("  {} {} {}", "-".yellow(), label, format!("skipped: {}", reason).dimmed())
            }
            TaskOutcome::Failed(e) => println!("  {} {} {}", "✗".red(), label.bold(), e.to_string().red()),
        }
    }
    println!();

    let elapsed = report.finished_at - report.started_at;
    if report.dry_run {
        println!(
            "{}",
            format!(
                "Dry run: {} volume(s) would be downloaded, {} skipped, {} failed",
                report.planned(),
                report.skipped(),
                report.failed()
            )
            .bold()
        );
    } else {
        let summary = format!(
            "{} succeeded, {} skipped, {} failed ({} in {}s)",
            report.succeeded(),
            report.skipped(),
            report.failed(),
            format_bytes(report.total_bytes()),
            elapsed.num_seconds()
        );
        if report.failed() > 0 {
            println!("{}", summary.red().bold());
        } else {
            println!("{}", summary.green().bold());
        }
    }
}
