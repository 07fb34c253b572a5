// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_manager;
pub mod archive_transport;
pub mod download_coordinator;
pub mod linkage_resolver;
pub mod manifest_export;
pub mod output_files;

// Re-export services for convenience
pub use agent_manager::{AgentGuard, AgentManager};
pub use archive_transport::ArchiveTransport;
pub use download_coordinator::{run_backup, DownloadCoordinator};
pub use linkage_resolver::LinkageResolver;
pub use manifest_export::{ExportReport, ManifestExporter};
