// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Manifest rendering
//!
//! Objects written to disk have their server-side bookkeeping removed so the
//! YAML can be re-applied to a fresh cluster.

use std::path::PathBuf;

use kube::api::DynamicObject;
use kube::Resource;
use serde::Serialize;

use crate::domain::cluster::ResourceType;

pub const CLUSTER_SCOPE_NAMESPACE: &str = "_cluster";
pub const DEFAULT_FILE_TEMPLATE: &str = "manifests/{namespace}/{resource}/{name}.yaml";

const FALLBACK_FILE_NAME: &str = "_.yaml";

/// Clone `obj` without managed fields, resource version and uid.
pub fn sanitized<K: Resource + Clone>(obj: &K) -> K {
    let mut obj = obj.clone();
    let meta = obj.meta_mut();
    meta.managed_fields = None;
    meta.resource_version = None;
    meta.uid = None;
    obj
}

pub fn to_yaml<T: Serialize>(obj: &T) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(obj)
}

/// File name template for exported manifests.
///
/// Supported placeholders: `{namespace}`, `{kind}`, `{kind_l}` (lowercase
/// kind), `{resource}`, `{group}`, `{version}` (alias `{v}`) and `{name}`.
/// Cluster-scoped objects get `_cluster` as their namespace. Every
/// substituted value is reduced to a single safe path component, so only the
/// template itself decides the directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameTemplate(String);

impl Default for FileNameTemplate {
    fn default() -> Self {
        Self(DEFAULT_FILE_TEMPLATE.to_string())
    }
}

impl FileNameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, resource: &ResourceType, obj: &DynamicObject) -> PathBuf {
        let namespace = obj
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(CLUSTER_SCOPE_NAMESPACE);
        let name = obj
            .metadata
            .name
            .as_deref()
            .or(obj.metadata.uid.as_deref())
            .unwrap_or("_");
        let group = if resource.group.is_empty() { "core" } else { &resource.group };

        let rendered = self
            .0
            .replace("{namespace}", &path_component(namespace))
            .replace("{kind_l}", &path_component(&resource.kind.to_lowercase()))
            .replace("{kind}", &path_component(&resource.kind))
            .replace("{resource}", &path_component(&resource.plural))
            .replace("{group}", &path_component(group))
            .replace("{version}", &path_component(&resource.version))
            .replace("{v}", &path_component(&resource.version))
            .replace("{name}", &path_component(name));

        let path = PathBuf::from(&rendered);
        if rendered.ends_with('/') || path.file_name().is_none() {
            return path.join(FALLBACK_FILE_NAME);
        }
        path
    }
}

/// Replace anything outside `[A-Za-z0-9._+-]` with `_`. `.` and `..` are
/// replaced whole.
fn path_component(value: &str) -> String {
    let component: String = value
        .chars()
        .map(|c| match c {
            '0'..='9' | 'A'..='Z' | 'a'..='z' | '_' | '-' | '+' | '.' => c,
            _ => '_',
        })
        .collect();

    match component.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => component,
    }
}
