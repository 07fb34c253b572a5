// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cluster Access Trait - Anti-Corruption Layer for the Kubernetes API
//!
//! Every component of the backup orchestrator talks to the cluster through
//! [`ClusterAccess`]. The trait is passed explicitly as
//! `Arc<dyn ClusterAccess>` into each service constructor, so tests can swap
//! the `kube` backed adapter for an in-memory fake.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("Kubernetes API error: {0}")]
    Api(String),
    #[error("Remote command failed: {0}")]
    Exec(String),
    #[error("Cluster configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Readable half of a remote process output stream.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// A running remote command inside a container.
///
/// `stdout` and `stderr` must be drained concurrently; `completion` resolves
/// once the remote process has exited and reports a non-success exit status
/// as [`ClusterError::Exec`].
pub struct ExecSession {
    pub stdout: ByteReader,
    pub stderr: Option<ByteReader>,
    pub completion: BoxFuture<'static, Result<(), ClusterError>>,
}

impl fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecSession")
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// An API resource type served by the cluster, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. `deployments`
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceType {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.plural)
        } else {
            write!(f, "{}.{}", self.plural, self.group)
        }
    }
}

#[async_trait]
pub trait ClusterAccess: Send + Sync {
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>, ClusterError>;
    async fn get_volume(&self, name: &str) -> Result<PersistentVolume, ClusterError>;

    /// List claims across all namespaces
    async fn list_claims(&self) -> Result<Vec<PersistentVolumeClaim>, ClusterError>;
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClusterError>;

    async fn list_attachments(&self) -> Result<Vec<VolumeAttachment>, ClusterError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClusterError>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, ClusterError>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError>;
    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet, ClusterError>;
    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, ClusterError>;

    /// Start `command` inside `container` of the given pod
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecSession, ClusterError>;

    /// Resource types that support the `list` verb
    async fn discover_resources(&self) -> Result<Vec<ResourceType>, ClusterError>;
    async fn list_resources(&self, resource: &ResourceType) -> Result<Vec<DynamicObject>, ClusterError>;
}
