// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! kubedump core
//!
//! Backs up Kubernetes persistent volumes through ephemeral extraction agents
//! and exports cluster manifests.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, backup services and the `kube` adapter

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
