// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Download tasks and the report summarising a backup run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::error::BackupError;
use crate::domain::volume::{Resolution, SkipReason};

pub const VOLUMES_DIR: &str = "volumes";

/// Output paths for one volume under the run's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub dir: PathBuf,
    pub volume: String,
}

impl OutputLayout {
    pub fn new(output: impl AsRef<Path>, volume: impl Into<String>) -> Self {
        Self {
            dir: output.as_ref().join(VOLUMES_DIR),
            volume: volume.into(),
        }
    }

    pub fn volume_manifest(&self) -> PathBuf {
        self.dir.join(format!("{}.yaml", self.volume))
    }

    pub fn claim_manifest(&self) -> PathBuf {
        self.dir.join(format!("{}-pvc.yaml", self.volume))
    }

    pub fn archive(&self) -> PathBuf {
        self.dir.join(format!("{}.tar.gz", self.volume))
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded { bytes: u64 },
    /// Resolved during a dry run; nothing was downloaded
    Planned,
    Skipped(SkipReason),
    Failed(BackupError),
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One target of a backup run: the name the operator asked for (or the volume
/// name when backing up everything) and how it resolved.
#[derive(Debug)]
pub struct DownloadTask {
    pub target: String,
    pub resolution: Result<Resolution, BackupError>,
}

impl DownloadTask {
    pub fn new(target: impl Into<String>, resolution: Result<Resolution, BackupError>) -> Self {
        Self {
            target: target.into(),
            resolution,
        }
    }
}

#[derive(Debug)]
pub struct TaskResult {
    pub target: String,
    pub volume: Option<String>,
    pub outcome: TaskOutcome,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub results: Vec<TaskResult>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Succeeded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Skipped(_)))
            .count()
    }

    pub fn planned(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Planned))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failed()).count()
    }

    pub fn failed_targets(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_failed())
            .map(|r| r.target.as_str())
            .collect()
    }

    pub fn outcome(&self, target: &str) -> Option<&TaskOutcome> {
        self.results
            .iter()
            .find(|r| r.target == target)
            .map(|r| &r.outcome)
    }

    pub fn total_bytes(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                TaskOutcome::Succeeded { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }
}
