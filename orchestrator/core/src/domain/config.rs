// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// kubedump configuration
//
// Defines the YAML configuration file and its discovery:
// - cluster connection (kubeconfig)
// - output directory
// - volume backup options (filters, targets, concurrency, agent settings)
// - manifest export options (template, namespace and resource filters)
//
// Every field has a default so an empty file (or no file at all) is valid.
// The CLI layers its flags on top of the loaded configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::agent::DEFAULT_AGENT_IMAGE;
use crate::domain::filter::NameFilter;
use crate::domain::manifest::DEFAULT_FILE_TEMPLATE;

pub const CONFIG_PATH_ENV: &str = "KUBEDUMP_CONFIG_PATH";
pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubedumpConfig {
    /// Path to a kubeconfig file. Falls back to `KUBECONFIG`, then the
    /// in-cluster service account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Root directory for everything kubedump writes
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub volumes: VolumeBackupConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub manifests: ManifestExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBackupConfig {
    /// Claim namespaces to include (empty = all)
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Claim namespaces to exclude; wins over `namespaces`
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,

    /// Volume or claim names to back up (empty = all volumes)
    #[serde(default)]
    pub targets: Vec<String>,

    /// Number of volumes downloaded in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Skip volumes without an attachment and claims that are not bound
    #[serde(default)]
    pub ignore_unbound: bool,

    /// Only resolve and print volumes
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for VolumeBackupConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            exclude_namespaces: Vec::new(),
            targets: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            ignore_unbound: false,
            dry_run: false,
        }
    }
}

impl VolumeBackupConfig {
    pub fn namespace_filter(&self) -> NameFilter {
        NameFilter::new(self.namespaces.clone(), self.exclude_namespaces.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_image")]
    pub image: String,

    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            image: default_agent_image(),
            ready_timeout: default_ready_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestExportConfig {
    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default)]
    pub exclude_namespaces: Vec<String>,

    /// Plural resource names to export (empty = all)
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default = "default_exclude_resources")]
    pub exclude_resources: Vec<String>,

    /// Leave out cluster-scoped resources
    #[serde(default)]
    pub no_cluster_scoped: bool,

    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ManifestExportConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            namespaces: Vec::new(),
            exclude_namespaces: Vec::new(),
            resources: Vec::new(),
            exclude_resources: default_exclude_resources(),
            no_cluster_scoped: false,
            dry_run: false,
        }
    }
}

impl ManifestExportConfig {
    pub fn namespace_filter(&self) -> NameFilter {
        NameFilter::new(self.namespaces.clone(), self.exclude_namespaces.clone())
    }

    pub fn resource_filter(&self) -> NameFilter {
        NameFilter::new(self.resources.clone(), self.exclude_resources.clone())
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("./out")
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_agent_image() -> String {
    DEFAULT_AGENT_IMAGE.to_string()
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_template() -> String {
    DEFAULT_FILE_TEMPLATE.to_string()
}

fn default_exclude_resources() -> Vec<String> {
    vec!["events".to_string(), "componentstatuses".to_string()]
}

impl Default for KubedumpConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            output: default_output(),
            volumes: VolumeBackupConfig::default(),
            agent: AgentConfig::default(),
            manifests: ManifestExportConfig::default(),
        }
    }
}

impl KubedumpConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Discover configuration file using precedence order
    /// 1. KUBEDUMP_CONFIG_PATH environment variable
    /// 2. ./kubedump.yaml (working directory)
    /// 3. ~/.kubedump/config.yaml (user home)
    /// 4. /etc/kubedump/config.yaml (Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./kubedump.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".kubedump").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/kubedump/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration: explicit path, then discovery, then defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Check values serde cannot reject on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.volumes.concurrency == 0 {
            anyhow::bail!("volumes.concurrency must be at least 1");
        }
        if self.agent.image.trim().is_empty() {
            anyhow::bail!("agent.image must not be empty");
        }
        if self.agent.ready_timeout.is_zero() {
            anyhow::bail!("agent.ready_timeout must be greater than zero");
        }
        if self.agent.poll_interval.is_zero() {
            anyhow::bail!("agent.poll_interval must be greater than zero");
        }
        if !self.manifests.template.contains("{name}") {
            anyhow::bail!(
                "manifests.template must contain {{name}}, got \"{}\"",
                self.manifests.template
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KUBEDUMP_OUTPUT") {
            self.output = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("KUBEDUMP_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.volumes.concurrency = n,
                _ => tracing::warn!("Ignoring invalid KUBEDUMP_CONCURRENCY value: {}", val),
            }
        }

        if let Ok(val) = std::env::var("KUBEDUMP_AGENT_IMAGE") {
            self.agent.image = val;
        }
    }
}
