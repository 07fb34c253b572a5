// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod kube_access;

pub use kube_access::KubeClusterAccess;
