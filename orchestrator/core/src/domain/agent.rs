// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Extraction agent
//!
//! An extraction agent is a throwaway pod mounting the target claim read-only
//! on the node that serves the volume. It does nothing on its own; the archive
//! transport execs into it to stream the volume contents out.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{
    Affinity, Container, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::domain::error::BackupError;
use crate::domain::volume::{NodeBinding, ResolvedVolume};

pub const AGENT_NAME_PREFIX: &str = "kubedump-";
pub const AGENT_CONTAINER: &str = "kubedump";
pub const AGENT_VOLUME: &str = "vol";
pub const AGENT_MOUNT_PATH: &str = "/mnt/vol";
pub const DEFAULT_AGENT_IMAGE: &str = "debian:bookworm";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kubedump";

/// Pod names are DNS subdomains
pub const MAX_POD_NAME_LEN: usize = 253;

pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_FAILED: &str = "Failed";
pub const PHASE_SUCCEEDED: &str = "Succeeded";

/// Pod name used for the agent extracting `volume`.
pub fn agent_name(volume: &str) -> String {
    format!("{}{}", AGENT_NAME_PREFIX, volume)
}

/// Reference to a created agent pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentHandle {
    pub namespace: String,
    pub name: String,
    pub volume: String,
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Builds agent pod manifests.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub image: String,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            image: DEFAULT_AGENT_IMAGE.to_string(),
        }
    }
}

impl AgentSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into() }
    }

    /// Synthesize the agent pod for a resolved volume.
    ///
    /// Fails when the volume is neither bound to a claim nor pinned to a node.
    pub fn build(&self, resolved: &ResolvedVolume) -> Result<Pod, BackupError> {
        let volume_name = resolved.name();
        let (claim_namespace, claim_name) = match (resolved.claim_namespace(), resolved.claim_name()) {
            (Some(ns), Some(name)) => (ns, name),
            _ => {
                return Err(BackupError::Resolution(format!(
                    "volume {} has no bound claim to mount",
                    volume_name
                )))
            }
        };

        let pod_name = agent_name(volume_name);
        if pod_name.len() > MAX_POD_NAME_LEN {
            return Err(BackupError::Resolution(format!(
                "volume {} is too long for an agent pod name ({} > {} characters)",
                volume_name,
                pod_name.len(),
                MAX_POD_NAME_LEN
            )));
        }

        let node_selector = node_selector_for(&resolved.node).ok_or_else(|| BackupError::AgentUnpinned {
            volume: volume_name.to_string(),
        })?;

        let labels = BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())]);

        Ok(Pod {
            metadata: ObjectMeta {
                name: Some(pod_name),
                namespace: Some(claim_namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                affinity: Some(Affinity {
                    node_affinity: Some(NodeAffinity {
                        required_during_scheduling_ignored_during_execution: Some(node_selector),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                restart_policy: Some("Never".to_string()),
                termination_grace_period_seconds: Some(0),
                containers: vec![Container {
                    name: AGENT_CONTAINER.to_string(),
                    image: Some(self.image.clone()),
                    command: Some(vec![
                        "tail".to_string(),
                        "-f".to_string(),
                        "/dev/null".to_string(),
                    ]),
                    volume_mounts: Some(vec![VolumeMount {
                        name: AGENT_VOLUME.to_string(),
                        mount_path: AGENT_MOUNT_PATH.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    }]),
                    resources: Some(ResourceRequirements {
                        limits: Some(quantities("500m", "1000Mi")),
                        requests: Some(quantities("0m", "0Mi")),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: AGENT_VOLUME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: claim_name.to_string(),
                        read_only: Some(true),
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

fn node_selector_for(binding: &NodeBinding) -> Option<NodeSelector> {
    match binding {
        NodeBinding::Affinity(selector) => Some(selector.clone()),
        NodeBinding::Node(node) => Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_fields: Some(vec![NodeSelectorRequirement {
                    key: "metadata.name".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![node.clone()]),
                }]),
                ..Default::default()
            }],
        }),
        NodeBinding::Unbound => None,
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::ConsumerSet;
    use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};

    fn resolved(node: NodeBinding) -> ResolvedVolume {
        resolved_named("pv-a", node)
    }

    fn resolved_named(volume: &str, node: NodeBinding) -> ResolvedVolume {
        ResolvedVolume {
            volume: PersistentVolume {
                metadata: ObjectMeta {
                    name: Some(volume.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            claim: Some(PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("pvc-a".to_string()),
                    namespace: Some("ns1".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            attachment: None,
            node,
            consumers: ConsumerSet::default(),
        }
    }

    fn required(pod: &Pod) -> NodeSelector {
        pod.spec
            .as_ref()
            .and_then(|s| s.affinity.as_ref())
            .and_then(|a| a.node_affinity.as_ref())
            .and_then(|n| n.required_during_scheduling_ignored_during_execution.clone())
            .unwrap()
    }

    #[test]
    fn test_agent_pinned_to_attachment_node() {
        let pod = AgentSpec::default()
            .build(&resolved(NodeBinding::Node("worker-1".to_string())))
            .unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("kubedump-pv-a"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("ns1"));

        let selector = required(&pod);
        let fields = selector.node_selector_terms[0].match_fields.as_ref().unwrap();
        assert_eq!(fields[0].key, "metadata.name");
        assert_eq!(fields[0].operator, "In");
        assert_eq!(fields[0].values.as_deref(), Some(&["worker-1".to_string()][..]));

        let spec = pod.spec.unwrap();
        assert_eq!(spec.termination_grace_period_seconds, Some(0));
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let container = &spec.containers[0];
        assert!(container.ports.is_none());
        assert_eq!(container.volume_mounts.as_ref().unwrap()[0].read_only, Some(true));
        let claim = spec.volumes.unwrap()[0].persistent_volume_claim.clone().unwrap();
        assert_eq!(claim.claim_name, "pvc-a");
        assert_eq!(claim.read_only, Some(true));
    }

    #[test]
    fn test_volume_affinity_copied_verbatim() {
        let selector = NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: "topology.kubernetes.io/zone".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["zone-a".to_string()]),
                }]),
                ..Default::default()
            }],
        };
        let pod = AgentSpec::default()
            .build(&resolved(NodeBinding::Affinity(selector.clone())))
            .unwrap();
        assert_eq!(required(&pod), selector);
    }

    #[test]
    fn test_unpinned_agent_refused() {
        let err = AgentSpec::default()
            .build(&resolved(NodeBinding::Unbound))
            .unwrap_err();
        assert!(matches!(err, BackupError::AgentUnpinned { volume } if volume == "pv-a"));
    }

    #[test]
    fn test_overlong_volume_name_is_rejected_before_create() {
        let node = NodeBinding::Node("worker-1".to_string());
        let longest = "v".repeat(MAX_POD_NAME_LEN - AGENT_NAME_PREFIX.len());
        let pod = AgentSpec::default().build(&resolved_named(&longest, node.clone())).unwrap();
        assert_eq!(pod.metadata.name.unwrap().len(), MAX_POD_NAME_LEN);

        let too_long = "v".repeat(MAX_POD_NAME_LEN);
        let err = AgentSpec::default().build(&resolved_named(&too_long, node)).unwrap_err();
        assert!(matches!(err, BackupError::Resolution(msg) if msg.contains(&too_long)));
    }
}
