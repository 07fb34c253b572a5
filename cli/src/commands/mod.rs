// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for kubedump CLI

pub mod config;
pub mod manifests;
pub mod volumes;

pub use self::config::ConfigCommand;
pub use self::manifests::ManifestsArgs;
pub use self::volumes::VolumesArgs;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use kubedump_core::domain::cluster::ClusterAccess;
use kubedump_core::domain::config::KubedumpConfig;
use kubedump_core::infrastructure::KubeClusterAccess;

/// Load configuration and apply the global `--kubeconfig` flag.
pub(crate) fn load_config(config_path: Option<PathBuf>, kubeconfig: Option<PathBuf>) -> Result<KubedumpConfig> {
    let mut config = KubedumpConfig::load_or_default(config_path).context("Failed to load configuration")?;
    if kubeconfig.is_some() {
        config.kubeconfig = kubeconfig;
    }
    Ok(config)
}

pub(crate) async fn connect(config: &KubedumpConfig) -> Result<Arc<dyn ClusterAccess>> {
    let cluster = KubeClusterAccess::connect(config.kubeconfig.as_deref())
        .await
        .context("Failed to connect to cluster")?;
    Ok(Arc::new(cluster))
}

/// Token cancelled on Ctrl+C. In-flight agents are still torn down.
pub(crate) fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C signal, cancelling");
            trigger.cancel();
        }
    });
    token
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
