// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::FutureExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, ObjectReference, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimStatus,
    PersistentVolumeClaimVolumeSource, PersistentVolumeSpec, Pod, PodSpec, PodStatus, Volume,
    VolumeNodeAffinity,
};
use k8s_openapi::api::storage::v1::{VolumeAttachment, VolumeAttachmentSource, VolumeAttachmentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DynamicObject, ObjectMeta};

use kubedump_core::application::archive_transport::ARCHIVE_PADDING_BYTES;
use kubedump_core::domain::cluster::{ClusterAccess, ClusterError, ExecSession, ResourceType};

/// What the fake remote archive command does.
#[derive(Debug, Clone)]
pub enum ExecBehaviour {
    /// Stream these bytes and exit cleanly
    Archive(Vec<u8>),
    /// Stream these bytes, then report a non-zero exit
    ExitError(Vec<u8>),
    /// Refuse to open the exec channel
    Refuse,
}

struct State {
    volumes: BTreeMap<String, PersistentVolume>,
    claims: BTreeMap<(String, String), PersistentVolumeClaim>,
    attachments: Vec<VolumeAttachment>,
    pods: BTreeMap<(String, String), Pod>,
    replica_sets: BTreeMap<(String, String), ReplicaSet>,
    deployments: BTreeMap<(String, String), Deployment>,
    stateful_sets: BTreeMap<(String, String), StatefulSet>,
    daemon_sets: BTreeMap<(String, String), DaemonSet>,
    resources: Vec<(ResourceType, Vec<DynamicObject>)>,
    unlistable: BTreeSet<String>,
    agent_phase: String,
    exec: ExecBehaviour,
    exec_delay: Duration,
    created: Vec<String>,
    deleted: Vec<String>,
    running_agents: usize,
    peak_agents: usize,
}

/// In-memory cluster. Agent pods created through it immediately report
/// `agent_phase`.
pub struct FakeCluster {
    state: Mutex<State>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                volumes: BTreeMap::new(),
                claims: BTreeMap::new(),
                attachments: Vec::new(),
                pods: BTreeMap::new(),
                replica_sets: BTreeMap::new(),
                deployments: BTreeMap::new(),
                stateful_sets: BTreeMap::new(),
                daemon_sets: BTreeMap::new(),
                resources: Vec::new(),
                unlistable: BTreeSet::new(),
                agent_phase: "Running".to_string(),
                exec: ExecBehaviour::Archive(sample_archive()),
                exec_delay: Duration::ZERO,
                created: Vec::new(),
                deleted: Vec::new(),
                running_agents: 0,
                peak_agents: 0,
            }),
        }
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_volume(&self, pv: PersistentVolume) {
        let name = pv.metadata.name.clone().unwrap();
        self.state.lock().unwrap().volumes.insert(name, pv);
    }

    pub fn volume_named(&self, name: &str) -> PersistentVolume {
        self.state.lock().unwrap().volumes[name].clone()
    }

    pub fn add_claim(&self, pvc: PersistentVolumeClaim) {
        let key = key_of(&pvc.metadata);
        self.state.lock().unwrap().claims.insert(key, pvc);
    }

    pub fn add_attachment(&self, va: VolumeAttachment) {
        self.state.lock().unwrap().attachments.push(va);
    }

    pub fn add_pod(&self, pod: Pod) {
        let key = key_of(&pod.metadata);
        self.state.lock().unwrap().pods.insert(key, pod);
    }

    pub fn add_replica_set(&self, rs: ReplicaSet) {
        let key = key_of(&rs.metadata);
        self.state.lock().unwrap().replica_sets.insert(key, rs);
    }

    pub fn add_deployment(&self, dp: Deployment) {
        let key = key_of(&dp.metadata);
        self.state.lock().unwrap().deployments.insert(key, dp);
    }

    pub fn add_stateful_set(&self, sts: StatefulSet) {
        let key = key_of(&sts.metadata);
        self.state.lock().unwrap().stateful_sets.insert(key, sts);
    }

    pub fn add_resources(&self, resource: ResourceType, objects: Vec<DynamicObject>) {
        self.state.lock().unwrap().resources.push((resource, objects));
    }

    pub fn make_unlistable(&self, plural: &str) {
        self.state.lock().unwrap().unlistable.insert(plural.to_string());
    }

    pub fn set_agent_phase(&self, phase: &str) {
        self.state.lock().unwrap().agent_phase = phase.to_string();
    }

    pub fn set_exec(&self, behaviour: ExecBehaviour) {
        self.state.lock().unwrap().exec = behaviour;
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = delay;
    }

    /// Names of agent pods created, in order
    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    /// Names of agent pods deleted, in order
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn peak_agents(&self) -> usize {
        self.state.lock().unwrap().peak_agents
    }

    pub fn pod_exists(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .pods
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

fn key_of(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn lookup<T: Clone>(
    map: &BTreeMap<(String, String), T>,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<T, ClusterError> {
    map.get(&(namespace.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| ClusterError::not_found(kind, format!("{}/{}", namespace, name)))
}

#[async_trait]
impl ClusterAccess for FakeCluster {
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>, ClusterError> {
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn get_volume(&self, name: &str) -> Result<PersistentVolume, ClusterError> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("PersistentVolume", name))
    }

    async fn list_claims(&self) -> Result<Vec<PersistentVolumeClaim>, ClusterError> {
        Ok(self.state.lock().unwrap().claims.values().cloned().collect())
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClusterError> {
        lookup(&self.state.lock().unwrap().claims, "PersistentVolumeClaim", namespace, name)
    }

    async fn list_attachments(&self) -> Result<Vec<VolumeAttachment>, ClusterError> {
        Ok(self.state.lock().unwrap().attachments.clone())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        lookup(&self.state.lock().unwrap().pods, "Pod", namespace, name)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = pod.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());
        if state.pods.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "Pod".to_string(),
                name,
            });
        }

        let mut created = pod.clone();
        created.status = Some(PodStatus {
            phase: Some(state.agent_phase.clone()),
            ..Default::default()
        });
        state.pods.insert(key, created.clone());
        state.created.push(name);
        state.running_agents += 1;
        state.peak_agents = state.peak_agents.max(state.running_agents);
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state
            .pods
            .remove(&(namespace.to_string(), name.to_string()))
            .is_none()
        {
            return Err(ClusterError::not_found("Pod", format!("{}/{}", namespace, name)));
        }
        state.deleted.push(name.to_string());
        state.running_agents = state.running_agents.saturating_sub(1);
        Ok(())
    }

    async fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, ClusterError> {
        lookup(&self.state.lock().unwrap().replica_sets, "ReplicaSet", namespace, name)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        lookup(&self.state.lock().unwrap().deployments, "Deployment", namespace, name)
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet, ClusterError> {
        lookup(&self.state.lock().unwrap().stateful_sets, "StatefulSet", namespace, name)
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, ClusterError> {
        lookup(&self.state.lock().unwrap().daemon_sets, "DaemonSet", namespace, name)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        _container: &str,
        _command: Vec<String>,
    ) -> Result<ExecSession, ClusterError> {
        let (behaviour, delay) = {
            let state = self.state.lock().unwrap();
            if !state.pods.contains_key(&(namespace.to_string(), pod.to_string())) {
                return Err(ClusterError::not_found("Pod", format!("{}/{}", namespace, pod)));
            }
            (state.exec.clone(), state.exec_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (bytes, completion) = match behaviour {
            ExecBehaviour::Archive(bytes) => (bytes, Ok(())),
            ExecBehaviour::ExitError(bytes) => (
                bytes,
                Err(ClusterError::Exec("command terminated with exit code 2".to_string())),
            ),
            ExecBehaviour::Refuse => return Err(ClusterError::Exec("upgrade request failed".to_string())),
        };

        Ok(ExecSession {
            stdout: Box::pin(std::io::Cursor::new(bytes)),
            stderr: Some(Box::pin(std::io::Cursor::new(Vec::new()))),
            completion: async move { completion }.boxed(),
        })
    }

    async fn discover_resources(&self) -> Result<Vec<ResourceType>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .resources
            .iter()
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn list_resources(&self, resource: &ResourceType) -> Result<Vec<DynamicObject>, ClusterError> {
        let state = self.state.lock().unwrap();
        if state.unlistable.contains(&resource.plural) {
            return Err(ClusterError::Api(format!("{} is forbidden", resource.plural)));
        }
        Ok(state
            .resources
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, objects)| objects.clone())
            .unwrap_or_default())
    }
}

/// What the remote archive pipeline streams for a volume holding `files`: a
/// tar stream followed by the zero padding, gzip'd at level 4.
pub fn volume_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, path, *data).unwrap();
    }
    let mut stream = tar.into_inner().unwrap();
    stream.resize(stream.len() + ARCHIVE_PADDING_BYTES as usize, 0);

    let mut gzip = GzEncoder::new(Vec::new(), Compression::new(4));
    gzip.write_all(&stream).unwrap();
    gzip.finish().unwrap()
}

pub fn sample_archive() -> Vec<u8> {
    volume_archive(&[
        ("html/index.html", &b"<h1>kubedump</h1>\n"[..]),
        ("db/pages.db", &[0x42u8; 8192][..]),
    ])
}

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        uid: Some(format!("uid-{}", name)),
        resource_version: Some("4711".to_string()),
        ..Default::default()
    }
}

fn owned_by(kind: &str, name: &str) -> Option<Vec<OwnerReference>> {
    Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        controller: Some(true),
        ..Default::default()
    }])
}

pub fn hostname_selector(node: &str) -> NodeSelector {
    NodeSelector {
        node_selector_terms: vec![NodeSelectorTerm {
            match_expressions: Some(vec![NodeSelectorRequirement {
                key: "kubernetes.io/hostname".to_string(),
                operator: "In".to_string(),
                values: Some(vec![node.to_string()]),
            }]),
            ..Default::default()
        }],
    }
}

/// A volume bound to `namespace/claim`, optionally pinned to a node by affinity.
pub fn volume(name: &str, claim: Option<(&str, &str)>, affinity_node: Option<&str>) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(None, name),
        spec: Some(PersistentVolumeSpec {
            claim_ref: claim.map(|(ns, claim)| ObjectReference {
                kind: Some("PersistentVolumeClaim".to_string()),
                namespace: Some(ns.to_string()),
                name: Some(claim.to_string()),
                ..Default::default()
            }),
            node_affinity: affinity_node.map(|node| VolumeNodeAffinity {
                required: Some(hostname_selector(node)),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn claim(namespace: &str, name: &str, volume: &str, phase: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(Some(namespace), name),
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: Some(volume.to_string()),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

pub fn attachment(name: &str, volume: &str, node: &str) -> VolumeAttachment {
    VolumeAttachment {
        metadata: meta(None, name),
        spec: VolumeAttachmentSpec {
            attacher: "csi.example.com".to_string(),
            node_name: node.to_string(),
            source: VolumeAttachmentSource {
                persistent_volume_name: Some(volume.to_string()),
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

/// A pod mounting `claim`, optionally owned by a controller.
pub fn consumer_pod(namespace: &str, name: &str, claim: &str, owner: Option<(&str, &str)>) -> Pod {
    let mut metadata = meta(Some(namespace), name);
    metadata.owner_references = owner.and_then(|(kind, owner)| owned_by(kind, owner));
    Pod {
        metadata,
        spec: Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "data".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim.to_string(),
                    read_only: None,
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn replica_set(namespace: &str, name: &str, deployment: &str) -> ReplicaSet {
    let mut metadata = meta(Some(namespace), name);
    metadata.owner_references = owned_by("Deployment", deployment);
    ReplicaSet {
        metadata,
        ..Default::default()
    }
}

pub fn deployment(namespace: &str, name: &str) -> Deployment {
    Deployment {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    }
}

pub fn stateful_set(namespace: &str, name: &str) -> StatefulSet {
    StatefulSet {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    }
}

pub fn dynamic_object(namespace: Option<&str>, name: &str) -> DynamicObject {
    DynamicObject {
        types: None,
        metadata: meta(namespace, name),
        data: serde_json::json!({ "spec": { "replicas": 1 } }),
    }
}

/// The cluster used across the volume scenarios:
///
/// - `pv-a`: claim `ns1/data-a`, affinity to `node-1`, used by pod `web-1`
///   of ReplicaSet `web-7f9c` owned by Deployment `web`
/// - `pv-b`: claim `ns2/data-b`, no affinity, no attachment
/// - `pv-c`: claim `ns1/data-c`, attached to `node-2`
/// - `pv-d`: no claim reference
pub fn scenario_cluster() -> FakeCluster {
    let cluster = FakeCluster::new();

    cluster.add_volume(volume("pv-a", Some(("ns1", "data-a")), Some("node-1")));
    cluster.add_claim(claim("ns1", "data-a", "pv-a", "Bound"));
    cluster.add_pod(consumer_pod("ns1", "web-1", "data-a", Some(("ReplicaSet", "web-7f9c"))));
    cluster.add_replica_set(replica_set("ns1", "web-7f9c", "web"));
    cluster.add_deployment(deployment("ns1", "web"));

    cluster.add_volume(volume("pv-b", Some(("ns2", "data-b")), None));
    cluster.add_claim(claim("ns2", "data-b", "pv-b", "Bound"));

    cluster.add_volume(volume("pv-c", Some(("ns1", "data-c")), None));
    cluster.add_claim(claim("ns1", "data-c", "pv-c", "Bound"));
    cluster.add_attachment(attachment("csi-c", "pv-c", "node-2"));

    cluster.add_volume(volume("pv-d", None, None));

    cluster
}
