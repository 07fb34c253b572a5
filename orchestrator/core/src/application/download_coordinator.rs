// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Download Coordinator
//!
//! Runs one download pipeline per resolved volume on a bounded pool of tokio
//! tasks:
//!
//! ```text
//! write manifests → spawn agent → wait ready → stream archive → delete agent
//! ```
//!
//! Every task records its own outcome; one volume failing never cancels the
//! others. Only a failure of the pool itself (a worker panicking) turns the
//! whole run into an error.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::agent_manager::AgentManager;
use crate::application::archive_transport::ArchiveTransport;
use crate::application::linkage_resolver::LinkageResolver;
use crate::domain::cluster::ClusterAccess;
use crate::domain::config::KubedumpConfig;
use crate::domain::download::{DownloadReport, DownloadTask, OutputLayout, TaskOutcome, TaskResult};
use crate::domain::error::BackupError;
use crate::domain::volume::{Resolution, ResolvedVolume};

pub struct DownloadCoordinator {
    agents: Arc<AgentManager>,
    transport: Arc<ArchiveTransport>,
    output: PathBuf,
    concurrency: usize,
    dry_run: bool,
}

impl DownloadCoordinator {
    pub fn new(cluster: Arc<dyn ClusterAccess>, config: &KubedumpConfig) -> Self {
        Self {
            agents: Arc::new(AgentManager::new(cluster.clone(), &config.agent)),
            transport: Arc::new(ArchiveTransport::new(cluster)),
            output: config.output.clone(),
            concurrency: config.volumes.concurrency.max(1),
            dry_run: config.volumes.dry_run,
        }
    }

    pub async fn run(&self, tasks: Vec<DownloadTask>, cancel: CancellationToken) -> Result<DownloadReport, BackupError> {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(tasks.len());
        let mut pending = Vec::new();

        for task in tasks {
            match task.resolution {
                Err(e) => {
                    error!("Volume {} failed to resolve: {}", task.target, e);
                    results.push(TaskResult {
                        target: task.target,
                        volume: None,
                        outcome: TaskOutcome::Failed(e),
                    });
                }
                Ok(Resolution::Skipped(reason)) => {
                    info!("Volume {} skipped: {}", task.target, reason);
                    results.push(TaskResult {
                        target: task.target,
                        volume: None,
                        outcome: TaskOutcome::Skipped(reason),
                    });
                }
                Ok(Resolution::Resolved(resolved)) => {
                    info!(
                        "Volume {} pvc/{} mounted to {}",
                        resolved.name(),
                        resolved.claim_name().unwrap_or("-"),
                        resolved.consumers.describe()
                    );
                    pending.push((task.target, resolved));
                }
            }
        }

        if self.dry_run {
            results.extend(pending.into_iter().map(|(target, resolved)| TaskResult {
                target,
                volume: Some(resolved.name().to_string()),
                outcome: TaskOutcome::Planned,
            }));
            return Ok(self.report(started_at, results));
        }

        info!(
            "Downloading {} volumes with {} workers",
            pending.len(),
            self.concurrency
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut workers: JoinSet<Result<TaskResult, BackupError>> = JoinSet::new();

        for (target, resolved) in pending {
            let permits = permits.clone();
            let agents = self.agents.clone();
            let transport = self.transport.clone();
            let layout = OutputLayout::new(&self.output, resolved.name());
            let cancel = cancel.clone();

            workers.spawn(async move {
                let volume = resolved.name().to_string();
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Volume {} not started: cancelled", volume);
                        return Ok(TaskResult {
                            target,
                            volume: Some(volume),
                            outcome: TaskOutcome::Failed(BackupError::Cancelled),
                        });
                    }
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(e) => return Err(BackupError::Pool(e.to_string())),
                    },
                };

                let outcome = match download(&agents, &transport, &resolved, &layout, &cancel).await {
                    Ok(bytes) => TaskOutcome::Succeeded { bytes },
                    Err(e) => {
                        error!("Fail to download {}: {}", volume, e);
                        TaskOutcome::Failed(e)
                    }
                };

                Ok(TaskResult {
                    target,
                    volume: Some(volume),
                    outcome,
                })
            });
        }

        let mut pool_errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => pool_errors.push(e.to_string()),
                Err(e) => pool_errors.push(format!("worker aborted: {}", e)),
            }
        }

        if !pool_errors.is_empty() {
            return Err(BackupError::Pool(pool_errors.join("; ")));
        }

        let report = self.report(started_at, results);
        info!(
            "Backup finished: {} succeeded, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    fn report(&self, started_at: chrono::DateTime<Utc>, mut results: Vec<TaskResult>) -> DownloadReport {
        results.sort_by(|a, b| a.target.cmp(&b.target));
        DownloadReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            results,
        }
    }
}

/// One volume: manifests first, then the agent-backed archive stream. The
/// agent is released on success, failure and cancellation alike.
async fn download(
    agents: &AgentManager,
    transport: &ArchiveTransport,
    resolved: &ResolvedVolume,
    layout: &OutputLayout,
    cancel: &CancellationToken,
) -> Result<u64, BackupError> {
    info!("Downloading volume {}", resolved.name());
    transport.write_manifests(resolved, layout).await?;

    let agent = agents.acquire(resolved).await?;
    let handle = agent.handle();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackupError::Cancelled),
        result = async {
            match agents.wait_ready(handle, agents.ready_timeout()).await {
                Ok(()) => transport.stream(handle, layout).await,
                Err(e) => Err(e),
            }
        } => result,
    };

    agent.release().await;
    result
}

/// Resolve the configured targets and download them.
pub async fn run_backup(
    cluster: Arc<dyn ClusterAccess>,
    config: &KubedumpConfig,
    cancel: CancellationToken,
) -> Result<DownloadReport, BackupError> {
    let resolver = LinkageResolver::new(
        cluster.clone(),
        config.volumes.namespace_filter(),
        config.volumes.ignore_unbound,
    );
    let tasks = resolver.plan(&config.volumes.targets).await?;
    DownloadCoordinator::new(cluster, config).run(tasks, cancel).await
}
