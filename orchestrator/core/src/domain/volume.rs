// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume linkage model
//!
//! A [`ResolvedVolume`] is the result of walking the graph from a
//! PersistentVolume to its claim, the pods and workloads consuming that claim,
//! and the node serving the volume's data.

use std::collections::BTreeSet;
use std::fmt;

use k8s_openapi::api::core::v1::{NodeSelector, PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use serde::{Deserialize, Serialize};

pub const CLAIM_KIND: &str = "PersistentVolumeClaim";
pub const CLAIM_PHASE_BOUND: &str = "Bound";

/// Higher-level workload owning a consumer pod.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Workload {
    Deployment(String),
    StatefulSet(String),
    DaemonSet(String),
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment(name) => write!(f, "deployment/{}", name),
            Self::StatefulSet(name) => write!(f, "statefulset/{}", name),
            Self::DaemonSet(name) => write!(f, "daemonset/{}", name),
        }
    }
}

/// Pods mounting a claim and the workloads owning them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerSet {
    /// Sorted by name
    pub pods: Vec<Pod>,
    pub workloads: BTreeSet<Workload>,
}

impl ConsumerSet {
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.workloads.is_empty()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.pods
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect()
    }

    pub fn workload_refs(&self) -> Vec<String> {
        self.workloads.iter().map(ToString::to_string).collect()
    }

    /// Human readable list of consumers, `no resources` when empty.
    pub fn describe(&self) -> String {
        let mut resources: Vec<String> = self
            .pod_names()
            .into_iter()
            .map(|name| format!("pod/{}", name))
            .collect();
        resources.extend(self.workload_refs());

        if resources.is_empty() {
            "no resources".to_string()
        } else {
            resources.join(", ")
        }
    }
}

/// Where the extraction agent has to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBinding {
    /// Required node selector copied from the volume's own node affinity
    Affinity(NodeSelector),
    /// Node named by the volume's attachment
    Node(String),
    /// No affinity and no attachment
    Unbound,
}

impl fmt::Display for NodeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Affinity(_) => write!(f, "volume node affinity"),
            Self::Node(node) => write!(f, "node/{}", node),
            Self::Unbound => write!(f, "unbound"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVolume {
    pub volume: PersistentVolume,
    pub claim: Option<PersistentVolumeClaim>,
    pub attachment: Option<VolumeAttachment>,
    pub node: NodeBinding,
    pub consumers: ConsumerSet,
}

impl ResolvedVolume {
    pub fn name(&self) -> &str {
        self.volume.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn claim_name(&self) -> Option<&str> {
        self.claim.as_ref().and_then(|c| c.metadata.name.as_deref())
    }

    pub fn claim_namespace(&self) -> Option<&str> {
        self.claim.as_ref().and_then(|c| c.metadata.namespace.as_deref())
    }
}

/// Why a volume was left out of the backup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoClaimReference,
    NotAClaim { kind: String },
    NamespaceFiltered { namespace: String },
    ClaimMissing { namespace: String, name: String },
    ClaimUnbound { namespace: String, name: String },
    NoAttachment,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoClaimReference => write!(f, "no claim reference"),
            Self::NotAClaim { kind } => write!(f, "claim reference points to a {}", kind),
            Self::NamespaceFiltered { namespace } => {
                write!(f, "namespace {} filtered out", namespace)
            }
            Self::ClaimMissing { namespace, name } => {
                write!(f, "claim {}/{} does not exist", namespace, name)
            }
            Self::ClaimUnbound { namespace, name } => {
                write!(f, "claim {}/{} is not bound", namespace, name)
            }
            Self::NoAttachment => write!(f, "no volume attachment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Box<ResolvedVolume>),
    Skipped(SkipReason),
}

impl Resolution {
    pub fn resolved(&self) -> Option<&ResolvedVolume> {
        match self {
            Self::Resolved(volume) => Some(volume),
            Self::Skipped(_) => None,
        }
    }
}
