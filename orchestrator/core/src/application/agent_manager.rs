// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Extraction Agent Manager
//!
//! Creates the node-pinned agent pod for a resolved volume, waits for it to
//! reach `Running` and tears it down again. [`AgentGuard`] ties the pod's
//! lifetime to a scope: `release()` deletes it on every normal exit path and
//! dropping an unreleased guard schedules a best-effort delete.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::agent::{AgentHandle, AgentSpec, PHASE_FAILED, PHASE_RUNNING, PHASE_SUCCEEDED};
use crate::domain::cluster::ClusterAccess;
use crate::domain::config::AgentConfig;
use crate::domain::error::BackupError;
use crate::domain::volume::ResolvedVolume;

pub struct AgentManager {
    cluster: Arc<dyn ClusterAccess>,
    spec: AgentSpec,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl AgentManager {
    pub fn new(cluster: Arc<dyn ClusterAccess>, config: &AgentConfig) -> Self {
        Self {
            cluster,
            spec: AgentSpec::new(config.image.clone()),
            ready_timeout: config.ready_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    /// Create the agent pod for `resolved`.
    ///
    /// A pod left behind by an interrupted earlier run is deleted and the
    /// create is retried once.
    pub async fn spawn(&self, resolved: &ResolvedVolume) -> Result<AgentHandle, BackupError> {
        let pod = self.spec.build(resolved)?;
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        let handle = AgentHandle {
            namespace: namespace.clone(),
            name,
            volume: resolved.name().to_string(),
        };

        match self.cluster.create_pod(&namespace, &pod).await {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => {
                warn!("Agent pod {} already exists, replacing stale agent", handle);
                self.delete(&handle).await?;
                self.wait_gone(&handle).await?;
                self.cluster.create_pod(&namespace, &pod).await?;
            }
            Err(e) => return Err(e.into()),
        }

        info!("Pod {} spawned", handle);
        Ok(handle)
    }

    /// Spawn an agent wrapped in a guard that owns its teardown.
    pub async fn acquire(&self, resolved: &ResolvedVolume) -> Result<AgentGuard, BackupError> {
        let handle = self.spawn(resolved).await?;
        Ok(AgentGuard::new(self.cluster.clone(), handle))
    }

    /// Poll the agent until it is `Running` or `timeout` elapses.
    pub async fn wait_ready(&self, handle: &AgentHandle, timeout: Duration) -> Result<(), BackupError> {
        info!("Waiting for pod {} to be ready", handle);
        let deadline = Instant::now() + timeout;

        loop {
            let pod = self.cluster.get_pod(&handle.namespace, &handle.name).await?;
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();

            match phase.as_str() {
                PHASE_RUNNING => {
                    debug!("Pod {} is running", handle);
                    return Ok(());
                }
                PHASE_FAILED | PHASE_SUCCEEDED => {
                    return Err(BackupError::AgentFailed {
                        pod: handle.name.clone(),
                        phase,
                    });
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(BackupError::Timeout {
                    pod: handle.name.clone(),
                    timeout,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Delete the agent pod. A pod that is already gone counts as deleted.
    pub async fn delete(&self, handle: &AgentHandle) -> Result<(), BackupError> {
        delete_agent(self.cluster.as_ref(), handle).await
    }

    async fn wait_gone(&self, handle: &AgentHandle) -> Result<(), BackupError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            match self.cluster.get_pod(&handle.namespace, &handle.name).await {
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
                Ok(_) if Instant::now() >= deadline => {
                    return Err(BackupError::Timeout {
                        pod: handle.name.clone(),
                        timeout: self.ready_timeout,
                    })
                }
                Ok(_) => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

async fn delete_agent(cluster: &dyn ClusterAccess, handle: &AgentHandle) -> Result<(), BackupError> {
    match cluster.delete_pod(&handle.namespace, &handle.name).await {
        Ok(()) => {
            info!("Pod {} deleted", handle);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!("Pod {} already gone", handle);
            Ok(())
        }
        Err(e) => Err(BackupError::Teardown {
            pod: handle.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Scoped ownership of a spawned agent pod.
pub struct AgentGuard {
    cluster: Arc<dyn ClusterAccess>,
    handle: AgentHandle,
    armed: bool,
}

impl AgentGuard {
    pub fn new(cluster: Arc<dyn ClusterAccess>, handle: AgentHandle) -> Self {
        Self {
            cluster,
            handle,
            armed: true,
        }
    }

    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// Delete the agent. Failures are logged for manual cleanup and never
    /// propagated.
    pub async fn release(mut self) {
        self.armed = false;
        if let Err(e) = delete_agent(self.cluster.as_ref(), &self.handle).await {
            error!("{}; delete it manually", e);
        }
    }
}

impl Drop for AgentGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!("Agent pod {} dropped without release, scheduling deletion", self.handle);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let cluster = self.cluster.clone();
                let handle = self.handle.clone();
                runtime.spawn(async move {
                    if let Err(e) = delete_agent(cluster.as_ref(), &handle).await {
                        error!("{}; delete it manually", e);
                    }
                });
            }
            Err(_) => error!("No runtime to delete agent pod {}; delete it manually", self.handle),
        }
    }
}
