// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Linkage Resolver Application Service
//!
//! Walks the object graph around a PersistentVolume:
//! - volume → claim (namespace filter, bound state)
//! - volume → node (explicit node affinity, else VolumeAttachment)
//! - claim → consuming pods → owning Deployment / StatefulSet / DaemonSet
//!
//! Read-only. Policy exclusions come back as [`Resolution::Skipped`]; lookup
//! failures come back as errors scoped to the volume being resolved.

use std::collections::BTreeSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, info, warn};

use crate::domain::cluster::{ClusterAccess, ClusterError};
use crate::domain::download::DownloadTask;
use crate::domain::error::BackupError;
use crate::domain::filter::NameFilter;
use crate::domain::volume::{
    ConsumerSet, NodeBinding, Resolution, ResolvedVolume, SkipReason, Workload, CLAIM_KIND,
    CLAIM_PHASE_BOUND,
};

pub struct LinkageResolver {
    cluster: Arc<dyn ClusterAccess>,
    namespaces: NameFilter,
    ignore_unbound: bool,
}

impl LinkageResolver {
    pub fn new(cluster: Arc<dyn ClusterAccess>, namespaces: NameFilter, ignore_unbound: bool) -> Self {
        Self {
            cluster,
            namespaces,
            ignore_unbound,
        }
    }

    /// Build download tasks for `targets`, or for every volume when empty.
    ///
    /// Only a failure to enumerate volumes is returned as an error; every
    /// per-target problem is recorded on its task.
    pub async fn plan(&self, targets: &[String]) -> Result<Vec<DownloadTask>, BackupError> {
        if targets.is_empty() {
            self.resolve_all().await
        } else {
            Ok(self.resolve_targets(targets).await)
        }
    }

    pub async fn resolve_all(&self) -> Result<Vec<DownloadTask>, BackupError> {
        let mut volumes = self.cluster.list_volumes().await?;
        volumes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        info!("Discovered {} persistent volumes", volumes.len());

        let mut tasks = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let name = volume.metadata.name.clone().unwrap_or_default();
            let resolution = self.resolve(volume).await;
            tasks.push(DownloadTask::new(name, resolution));
        }
        Ok(tasks)
    }

    pub async fn resolve_targets(&self, targets: &[String]) -> Vec<DownloadTask> {
        let mut tasks = Vec::with_capacity(targets.len());
        for target in targets {
            let resolution = match self.lookup_target(target).await {
                Ok(volume) => self.resolve(volume).await,
                Err(e) => Err(e),
            };
            tasks.push(DownloadTask::new(target.clone(), resolution));
        }
        tasks
    }

    /// Find the volume an operator-supplied name refers to: a volume name
    /// first, otherwise a claim name resolved through its bound volume.
    pub async fn lookup_target(&self, target: &str) -> Result<PersistentVolume, BackupError> {
        match self.cluster.get_volume(target).await {
            Ok(volume) => return Ok(volume),
            Err(e) if e.is_not_found() => {
                debug!("No volume named {}, trying claims", target);
            }
            Err(e) => return Err(e.into()),
        }

        let claims: Vec<PersistentVolumeClaim> = self
            .cluster
            .list_claims()
            .await?
            .into_iter()
            .filter(|c| c.metadata.name.as_deref() == Some(target))
            .collect();

        let claim = match claims.as_slice() {
            [] => {
                return Err(BackupError::Resolution(format!(
                    "Volume or claim \"{}\" not found",
                    target
                )))
            }
            [claim] => claim,
            _ => {
                let namespaces: Vec<&str> = claims
                    .iter()
                    .filter_map(|c| c.metadata.namespace.as_deref())
                    .collect();
                return Err(BackupError::Resolution(format!(
                    "Claim \"{}\" exists in several namespaces ({}); use the volume name instead",
                    target,
                    namespaces.join(", ")
                )));
            }
        };

        let volume_name = claim
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| BackupError::Resolution(format!("Claim \"{}\" is not bound", target)))?;

        match self.cluster.get_volume(volume_name).await {
            Ok(volume) => Ok(volume),
            Err(e) if e.is_not_found() => Err(BackupError::Resolution(format!(
                "Claim \"{}\" is bound to volume \"{}\" which does not exist",
                target, volume_name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn resolve(&self, volume: PersistentVolume) -> Result<Resolution, BackupError> {
        let volume_name = volume.metadata.name.clone().unwrap_or_default();

        let claim_ref = match volume.spec.as_ref().and_then(|s| s.claim_ref.as_ref()) {
            Some(claim_ref) => claim_ref,
            None => return Ok(skip(&volume_name, SkipReason::NoClaimReference)),
        };

        let kind = claim_ref.kind.as_deref().unwrap_or_default();
        if kind != CLAIM_KIND {
            return Ok(skip(
                &volume_name,
                SkipReason::NotAClaim {
                    kind: kind.to_string(),
                },
            ));
        }

        let claim_namespace = claim_ref.namespace.clone().unwrap_or_default();
        let claim_name = claim_ref.name.clone().unwrap_or_default();

        if !self.namespaces.includes(&claim_namespace) {
            return Ok(skip(
                &volume_name,
                SkipReason::NamespaceFiltered {
                    namespace: claim_namespace,
                },
            ));
        }

        let explicit_affinity = volume
            .spec
            .as_ref()
            .and_then(|s| s.node_affinity.as_ref())
            .and_then(|a| a.required.clone());

        let (node, attachment) = match explicit_affinity {
            Some(selector) => (NodeBinding::Affinity(selector), None),
            None => match self.find_attachment(&volume_name).await? {
                Some(attachment) => (NodeBinding::Node(attachment.spec.node_name.clone()), Some(attachment)),
                None if self.ignore_unbound => {
                    return Ok(skip(&volume_name, SkipReason::NoAttachment));
                }
                None => {
                    warn!("Volume {} has no node affinity and no attachment", volume_name);
                    (NodeBinding::Unbound, None)
                }
            },
        };

        let claim = match self.cluster.get_claim(&claim_namespace, &claim_name).await {
            Ok(claim) => claim,
            Err(e) if e.is_not_found() => {
                return Ok(skip(
                    &volume_name,
                    SkipReason::ClaimMissing {
                        namespace: claim_namespace,
                        name: claim_name,
                    },
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let phase = claim.status.as_ref().and_then(|s| s.phase.as_deref());
        if self.ignore_unbound && phase != Some(CLAIM_PHASE_BOUND) {
            return Ok(skip(
                &volume_name,
                SkipReason::ClaimUnbound {
                    namespace: claim_namespace,
                    name: claim_name,
                },
            ));
        }

        let consumers = self.resolve_consumers(&claim_namespace, &claim_name).await?;

        debug!(
            "Volume {} resolved to pvc/{} on {} ({})",
            volume_name,
            claim_name,
            node,
            consumers.describe()
        );

        Ok(Resolution::Resolved(Box::new(ResolvedVolume {
            volume,
            claim: Some(claim),
            attachment,
            node,
            consumers,
        })))
    }

    /// First attachment whose source is `volume_name`. Several attachments
    /// pointing the same volume at different nodes are a conflict.
    async fn find_attachment(&self, volume_name: &str) -> Result<Option<VolumeAttachment>, BackupError> {
        let matches: Vec<VolumeAttachment> = self
            .cluster
            .list_attachments()
            .await?
            .into_iter()
            .filter(|a| a.spec.source.persistent_volume_name.as_deref() == Some(volume_name))
            .collect();

        let nodes: BTreeSet<&str> = matches.iter().map(|a| a.spec.node_name.as_str()).collect();
        if nodes.len() > 1 {
            return Err(BackupError::Resolution(format!(
                "Volume {} has conflicting attachments on nodes {}",
                volume_name,
                nodes.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(matches.into_iter().next())
    }

    async fn resolve_consumers(&self, namespace: &str, claim_name: &str) -> Result<ConsumerSet, BackupError> {
        let mut pods: Vec<Pod> = self
            .cluster
            .list_pods(namespace)
            .await?
            .into_iter()
            .filter(|pod| mounts_claim(pod, claim_name))
            .collect();
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

        let mut workloads = BTreeSet::new();
        for pod in &pods {
            for owner in pod.metadata.owner_references.iter().flatten() {
                self.resolve_owner(namespace, owner, &mut workloads).await?;
            }
        }

        Ok(ConsumerSet { pods, workloads })
    }

    async fn resolve_owner(
        &self,
        namespace: &str,
        owner: &OwnerReference,
        workloads: &mut BTreeSet<Workload>,
    ) -> Result<(), BackupError> {
        match owner.kind.as_str() {
            "ReplicaSet" => {
                let Some(rs) = tolerate_missing(self.cluster.get_replica_set(namespace, &owner.name).await)? else {
                    return Ok(());
                };
                for rs_owner in rs.metadata.owner_references.iter().flatten() {
                    if rs_owner.kind != "Deployment" {
                        continue;
                    }
                    if let Some(dp) = tolerate_missing(self.cluster.get_deployment(namespace, &rs_owner.name).await)? {
                        workloads.insert(Workload::Deployment(dp.metadata.name.unwrap_or_else(|| rs_owner.name.clone())));
                    }
                }
            }
            "Deployment" => {
                if let Some(dp) = tolerate_missing(self.cluster.get_deployment(namespace, &owner.name).await)? {
                    workloads.insert(Workload::Deployment(dp.metadata.name.unwrap_or_else(|| owner.name.clone())));
                }
            }
            "StatefulSet" => {
                if let Some(sts) = tolerate_missing(self.cluster.get_stateful_set(namespace, &owner.name).await)? {
                    workloads.insert(Workload::StatefulSet(sts.metadata.name.unwrap_or_else(|| owner.name.clone())));
                }
            }
            "DaemonSet" => {
                if let Some(ds) = tolerate_missing(self.cluster.get_daemon_set(namespace, &owner.name).await)? {
                    workloads.insert(Workload::DaemonSet(ds.metadata.name.unwrap_or_else(|| owner.name.clone())));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn skip(volume: &str, reason: SkipReason) -> Resolution {
    info!("Volume {} skipped: {}", volume, reason);
    Resolution::Skipped(reason)
}

fn mounts_claim(pod: &Pod, claim_name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .map(|volumes| {
            volumes.iter().any(|v| {
                v.persistent_volume_claim
                    .as_ref()
                    .is_some_and(|pvc| pvc.claim_name == claim_name)
            })
        })
        .unwrap_or(false)
}

/// Owners deleted between listing and lookup are ignored.
fn tolerate_missing<T>(result: Result<T, ClusterError>) -> Result<Option<T>, BackupError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            debug!("Ignoring missing owner: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
