// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Manifest Export Application Service
//!
//! Dumps every listable object in the cluster as YAML:
//! discovery → resource filter → list → namespace filter → sanitize → write.
//!
//! A resource type that cannot be listed (RBAC, aggregated API down) is
//! logged and recorded in the report; it does not stop the export.

use std::path::PathBuf;
use std::sync::Arc;

use kube::api::DynamicObject;
use kube::core::TypeMeta;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::output_files;
use crate::domain::cluster::{ClusterAccess, ResourceType};
use crate::domain::config::ManifestExportConfig;
use crate::domain::error::BackupError;
use crate::domain::filter::NameFilter;
use crate::domain::manifest::{sanitized, to_yaml, FileNameTemplate};

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    /// Files written, or that would be written in a dry run
    pub written: Vec<PathBuf>,
    /// Resource types left out by the filters
    pub skipped_types: Vec<String>,
    /// Resource types whose listing failed, with the error
    pub failed_types: Vec<(String, String)>,
}

pub struct ManifestExporter {
    cluster: Arc<dyn ClusterAccess>,
    output: PathBuf,
    template: FileNameTemplate,
    namespaces: NameFilter,
    resources: NameFilter,
    no_cluster_scoped: bool,
    dry_run: bool,
}

impl ManifestExporter {
    pub fn new(cluster: Arc<dyn ClusterAccess>, output: impl Into<PathBuf>, config: &ManifestExportConfig) -> Self {
        Self {
            cluster,
            output: output.into(),
            template: FileNameTemplate::new(config.template.clone()),
            namespaces: config.namespace_filter(),
            resources: config.resource_filter(),
            no_cluster_scoped: config.no_cluster_scoped,
            dry_run: config.dry_run,
        }
    }

    pub async fn export(&self, cancel: &CancellationToken) -> Result<ExportReport, BackupError> {
        let mut types = self.cluster.discover_resources().await?;
        types.sort_by(|a, b| (&a.group, &a.plural).cmp(&(&b.group, &b.plural)));

        let mut report = ExportReport::default();
        for resource in &types {
            if cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }

            if self.no_cluster_scoped && !resource.namespaced {
                debug!("Skipping cluster-scoped resource {}", resource);
                report.skipped_types.push(resource.to_string());
                continue;
            }

            if !self.resources.includes(&resource.plural) {
                info!("Skipping {} resource because of resource filters", resource);
                report.skipped_types.push(resource.to_string());
                continue;
            }

            info!("Loading {} resource", resource);
            let objects = match self.cluster.list_resources(resource).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!("Cannot list {}: {}", resource, e);
                    report.failed_types.push((resource.to_string(), e.to_string()));
                    continue;
                }
            };

            for obj in objects {
                if let Some(path) = self.write_object(resource, obj).await? {
                    report.written.push(path);
                }
            }
        }

        info!(
            "Exported {} manifests ({} resource types skipped, {} failed)",
            report.written.len(),
            report.skipped_types.len(),
            report.failed_types.len()
        );
        Ok(report)
    }

    /// Cluster-scoped objects always pass the namespace filter.
    async fn write_object(&self, resource: &ResourceType, mut obj: DynamicObject) -> Result<Option<PathBuf>, BackupError> {
        if let Some(namespace) = obj.metadata.namespace.as_deref() {
            if !self.namespaces.includes(namespace) {
                return Ok(None);
            }
        }

        if obj.types.is_none() {
            obj.types = Some(TypeMeta {
                api_version: resource.api_version(),
                kind: resource.kind.clone(),
            });
        }

        let path = self.output.join(self.template.render(resource, &obj));
        if self.dry_run {
            info!("Would write {}", path.display());
            return Ok(Some(path));
        }

        if let Some(parent) = path.parent() {
            output_files::create_dir(parent).await?;
        }
        let yaml = to_yaml(&sanitized(&obj))?;
        output_files::write_file(&path, yaml).await?;
        debug!("Wrote {}", path.display());
        Ok(Some(path))
    }
}
