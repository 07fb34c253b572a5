// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use futures::FutureExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::api::{ApiResource, AttachParams, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{verbs, Discovery, Scope};
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::domain::cluster::{ByteReader, ClusterAccess, ClusterError, ExecSession, ResourceType};

const EXEC_SUCCESS: &str = "Success";

/// [`ClusterAccess`] backed by a live API server through `kube`.
pub struct KubeClusterAccess {
    client: Client,
}

impl KubeClusterAccess {
    /// Connect using an explicit kubeconfig file, or the usual inference chain
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster service account) when none
    /// is given.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, ClusterError> {
        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ClusterError::Config(format!("Failed to read kubeconfig {}: {}", path.display(), e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?
            }
            None => Config::infer().await.map_err(|e| {
                ClusterError::Config(format!(
                    "Failed to load cluster configuration: {}\n\n\
                     Set KUBECONFIG, pass --kubeconfig, or run inside a cluster.",
                    e
                ))
            })?,
        };

        info!("Connecting to cluster at {}", config.cluster_url);
        let client = Client::try_from(config).map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn get_namespaced<K>(&self, kind: &str, namespace: &str, name: &str) -> Result<K, ClusterError>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
            .map_err(|e| api_error(e, kind, &format!("{}/{}", namespace, name)))
    }
}

/// Map the API status codes the services branch on; everything else stays opaque.
fn api_error(err: kube::Error, kind: &str, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::not_found(kind, name),
        kube::Error::Api(resp) if resp.code == 409 => ClusterError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        e => ClusterError::Api(e.to_string()),
    }
}

#[async_trait]
impl ClusterAccess for KubeClusterAccess {
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>, ClusterError> {
        let list = Api::<PersistentVolume>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, "PersistentVolume", "*"))?;
        Ok(list.items)
    }

    async fn get_volume(&self, name: &str) -> Result<PersistentVolume, ClusterError> {
        Api::<PersistentVolume>::all(self.client.clone())
            .get(name)
            .await
            .map_err(|e| api_error(e, "PersistentVolume", name))
    }

    async fn list_claims(&self) -> Result<Vec<PersistentVolumeClaim>, ClusterError> {
        let list = Api::<PersistentVolumeClaim>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, "PersistentVolumeClaim", "*"))?;
        Ok(list.items)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, ClusterError> {
        self.get_namespaced("PersistentVolumeClaim", namespace, name).await
    }

    async fn list_attachments(&self) -> Result<Vec<VolumeAttachment>, ClusterError> {
        let list = Api::<VolumeAttachment>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, "VolumeAttachment", "*"))?;
        Ok(list.items)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        let list = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, "Pod", namespace))?;
        Ok(list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.get_namespaced("Pod", namespace, name).await
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClusterError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        Api::<Pod>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| api_error(e, "Pod", &format!("{}/{}", namespace, name)))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..Default::default()
        };
        Api::<Pod>::namespaced(self.client.clone(), namespace)
            .delete(name, &params)
            .await
            .map_err(|e| api_error(e, "Pod", &format!("{}/{}", namespace, name)))?;
        Ok(())
    }

    async fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, ClusterError> {
        self.get_namespaced("ReplicaSet", namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        self.get_namespaced("Deployment", namespace, name).await
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet, ClusterError> {
        self.get_namespaced("StatefulSet", namespace, name).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, ClusterError> {
        self.get_namespaced("DaemonSet", namespace, name).await
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecSession, ClusterError> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        debug!("Exec in {}/{}: {:?}", namespace, pod, command);
        let mut attached = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .exec(pod, command, &params)
            .await
            .map_err(|e| ClusterError::Exec(format!("Failed to exec in {}/{}: {}", namespace, pod, e)))?;

        let stdout = attached
            .stdout()
            .ok_or_else(|| ClusterError::Exec("exec session has no stdout".to_string()))?;
        let stderr = attached.stderr();
        let status = attached
            .take_status()
            .ok_or_else(|| ClusterError::Exec("exec session has no status channel".to_string()))?;

        let completion = async move {
            let status = status.await;
            attached
                .join()
                .await
                .map_err(|e| ClusterError::Exec(e.to_string()))?;

            match status {
                Some(s) if s.status.as_deref() == Some(EXEC_SUCCESS) => Ok(()),
                Some(s) => Err(ClusterError::Exec(
                    s.message.unwrap_or_else(|| "remote command exited with an error".to_string()),
                )),
                None => Err(ClusterError::Exec("remote command ended without a status".to_string())),
            }
        }
        .boxed();

        Ok(ExecSession {
            stdout: Box::pin(stdout),
            stderr: stderr.map(|s| -> ByteReader { Box::pin(s) }),
            completion,
        })
    }

    async fn discover_resources(&self) -> Result<Vec<ResourceType>, ClusterError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| ClusterError::Api(format!("API discovery failed: {}", e)))?;

        let mut types = Vec::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                types.push(ResourceType {
                    group: ar.group,
                    version: ar.version,
                    kind: ar.kind,
                    plural: ar.plural,
                    namespaced: caps.scope == Scope::Namespaced,
                });
            }
        }
        debug!("Discovered {} listable resource types", types.len());
        Ok(types)
    }

    async fn list_resources(&self, resource: &ResourceType) -> Result<Vec<DynamicObject>, ClusterError> {
        let ar = ApiResource {
            group: resource.group.clone(),
            version: resource.version.clone(),
            api_version: resource.api_version(),
            kind: resource.kind.clone(),
            plural: resource.plural.clone(),
        };
        let list = Api::<DynamicObject>::all_with(self.client.clone(), &ar)
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, &resource.kind, "*"))?;
        Ok(list.items)
    }
}
