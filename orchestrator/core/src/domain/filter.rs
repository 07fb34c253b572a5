// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Include/exclude name filtering shared by volume backup and manifest export.

use serde::{Deserialize, Serialize};

/// Returns true when `name` passes the filter.
///
/// The exclude list always wins. An empty include list admits every name
/// that is not excluded.
pub fn is_included(name: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|item| item == name) {
        return false;
    }

    include.is_empty() || include.iter().any(|item| item == name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameFilter {
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl NameFilter {
    pub fn new(only: Vec<String>, exclude: Vec<String>) -> Self {
        Self { only, exclude }
    }

    pub fn includes(&self, name: &str) -> bool {
        is_included(name, &self.only, &self.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_include_admits_everything() {
        assert!(is_included("ns1", &[], &[]));
        assert!(is_included("kube-system", &[], &names(&["default"])));
    }

    #[test]
    fn test_include_list_restricts() {
        let only = names(&["ns1", "ns2"]);
        assert!(is_included("ns1", &only, &[]));
        assert!(!is_included("ns3", &only, &[]));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let only = names(&["ns1"]);
        let exclude = names(&["ns1"]);
        assert!(!is_included("ns1", &only, &exclude));
    }

    #[test]
    fn test_name_filter() {
        let filter = NameFilter::new(vec![], names(&["events"]));
        assert!(!filter.includes("events"));
        assert!(filter.includes("pods"));
    }
}
