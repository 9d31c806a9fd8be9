use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use jarvis_model::services::{
    GATEWAY_SERVICE, NOTIFICATION_SERVICE, ORDER_SERVICE, PRODUCT_SERVICE, USER_SERVICE,
};
use serde::{Deserialize, Serialize};

/// Directed "depends on" graph between services and their datastores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl ServiceGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Topology of the known service catalogue.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_edges(
                GATEWAY_SERVICE,
                [USER_SERVICE, PRODUCT_SERVICE, ORDER_SERVICE, NOTIFICATION_SERVICE],
            )
            .with_edges(USER_SERVICE, ["users-db"])
            .with_edges(PRODUCT_SERVICE, ["products-db"])
            .with_edges(
                ORDER_SERVICE,
                ["orders-db", USER_SERVICE, PRODUCT_SERVICE, NOTIFICATION_SERVICE],
            )
            .with_edges(NOTIFICATION_SERVICE, ["notifications-db"])
    }

    /// Adds `from -> to` for every `to`.
    #[must_use]
    pub fn with_edges<'a>(mut self, from: &str, to: impl IntoIterator<Item = &'a str>) -> Self {
        let deps = self.edges.entry(from.to_string()).or_default();
        for dep in to {
            if !deps.iter().any(|existing| existing == dep) {
                deps.push(dep.to_string());
            }
        }
        for dep in self.edges.values().flatten().cloned().collect::<Vec<_>>() {
            self.edges.entry(dep).or_default();
        }
        self
    }

    /// Every node.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Direct dependencies of `node`.
    #[must_use]
    pub fn dependencies_of(&self, node: &str) -> &[String] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes that depend directly on `node`.
    #[must_use]
    pub fn dependents_of(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.iter().any(|dep| dep == node))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Targets plus every node within `hop_limit` edges of them, following
    /// edges in both directions.
    #[must_use]
    pub fn closure(&self, targets: &[String], hop_limit: usize) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = targets.iter().cloned().collect();
        let mut frontier: VecDeque<(String, usize)> =
            targets.iter().map(|target| (target.clone(), 0)).collect();
        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= hop_limit {
                continue;
            }
            let neighbours = self
                .dependencies_of(&node)
                .iter()
                .map(String::as_str)
                .chain(self.dependents_of(&node));
            for next in neighbours {
                if seen.insert(next.to_string()) {
                    frontier.push_back((next.to_string(), depth + 1));
                }
            }
        }
        seen
    }
}
