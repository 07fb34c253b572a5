// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::cluster::ClusterError;

/// Failure of a single volume backup, or of the orchestration around it.
///
/// Skipped volumes are not errors; see [`crate::domain::volume::SkipReason`].
/// `Teardown` is only ever logged by the agent manager and never returned from
/// a download pipeline.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("Volume {volume} has neither node affinity nor a volume attachment; refusing to spawn an unpinned agent")]
    AgentUnpinned { volume: String },

    #[error("Agent pod {pod} entered phase {phase} before becoming ready")]
    AgentFailed { pod: String, phase: String },

    #[error("Agent pod {pod} not ready after {}", humantime::format_duration(*.timeout))]
    Timeout { pod: String, timeout: Duration },

    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Archive {} is truncated ({bytes} bytes received)", .path.display())]
    Truncated { path: PathBuf, bytes: u64 },

    #[error("Failed to delete agent pod {pod}: {message}")]
    Teardown { pod: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Worker pool failure: {0}")]
    Pool(String),
}

impl BackupError {
    /// Readiness timeouts usually point at a scheduling problem that may clear up on retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_yaml::Error> for BackupError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
