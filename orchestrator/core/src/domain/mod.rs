// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model for volume backups and manifest export.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Cluster access contract, linkage model, agent and download types

pub mod agent;
pub mod cluster;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod volume;
