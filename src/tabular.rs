//! Two-table spreadsheet import.
//!
//! The tables are turned into DSL text and handed to the regular parser, so
//! there is exactly one way a graph gets built.

use crate::ir::{EdgeType, Graph, identity_key};
use crate::parser::parse;
use crate::regenerate::quote;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    #[serde(rename = "Node", default)]
    pub node: String,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Cluster", default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(rename = "Parent-cluster", default, skip_serializing_if = "Option::is_none")]
    pub parent_cluster: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Destination", default)]
    pub destination: String,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(rename = "Label", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

impl Tables {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn to_dsl(&self) -> String {
        tables_to_dsl(&self.nodes, &self.edges)
    }

    pub fn into_graph(self) -> Graph {
        parse(&self.to_dsl())
    }
}

fn cell(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

struct TableCluster<'a> {
    label: &'a str,
    parent: Option<&'a str>,
    nodes: Vec<&'a NodeRow>,
}

/// Synthesizes DSL text: unclustered nodes, then every cluster depth-first
/// from its root with its nodes nested under it, then all edge lines.
///
/// A cluster's parent is the first non-empty `Parent-cluster` among its rows.
/// Clusters whose parent never appears in the `Cluster` column are roots.
pub fn tables_to_dsl(nodes: &[NodeRow], edges: &[EdgeRow]) -> String {
    let mut clusters: Vec<TableCluster> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut floating: Vec<&NodeRow> = Vec::new();

    for row in nodes {
        let Some(label) = cell(&row.cluster) else {
            if !row.node.trim().is_empty() {
                floating.push(row);
            }
            continue;
        };
        let idx = *by_key.entry(identity_key(label, None)).or_insert_with(|| {
            clusters.push(TableCluster {
                label,
                parent: None,
                nodes: Vec::new(),
            });
            clusters.len() - 1
        });
        let entry = &mut clusters[idx];
        if entry.parent.is_none() {
            entry.parent = cell(&row.parent_cluster);
        }
        if !row.node.trim().is_empty() {
            entry.nodes.push(row);
        }
    }

    let parent_of: Vec<Option<usize>> = clusters
        .iter()
        .enumerate()
        .map(|(idx, cluster)| {
            cluster
                .parent
                .and_then(|parent| by_key.get(&identity_key(parent, None)).copied())
                .filter(|&parent| parent != idx)
        })
        .collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); clusters.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (idx, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(idx),
            None => roots.push(idx),
        }
    }

    let mut lines: Vec<String> = floating.iter().map(|row| node_line(row)).collect();
    let mut emitted: HashSet<usize> = HashSet::new();
    // Clusters stuck in a parent cycle are never reached from a root.
    let starts: Vec<usize> = roots.into_iter().chain(0..clusters.len()).collect();
    for start in starts {
        let mut stack = vec![(start, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            if !emitted.insert(idx) {
                continue;
            }
            let cluster = &clusters[idx];
            lines.push(format!("{}Cluster: {}", "  ".repeat(depth), cluster.label));
            for row in &cluster.nodes {
                lines.push(format!("{}{}", "  ".repeat(depth + 1), node_line(row)));
            }
            for &child in children[idx].iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    for edge in edges {
        if let Some(line) = edge_line(edge) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn node_line(row: &NodeRow) -> String {
    match cell(&row.name) {
        Some(name) => format!("Node: {} [name={}]", row.node.trim(), name),
        None => format!("Node: {}", row.node.trim()),
    }
}

fn edge_line(row: &EdgeRow) -> Option<String> {
    let source = row.source.trim();
    let destination = row.destination.trim();
    if source.is_empty() || destination.is_empty() {
        return None;
    }
    let mut attrs = Vec::new();
    let edge_type = cell(&row.edge_type).map(EdgeType::from_token).unwrap_or_default();
    if edge_type != EdgeType::Solid {
        attrs.push(format!("arrow={}", edge_type.as_token()));
    }
    if let Some(label) = cell(&row.label) {
        attrs.push(format!("label={}", quote(label)));
    }
    if attrs.is_empty() {
        Some(format!("{source} -> {destination}"))
    } else {
        Some(format!("{source} -> {destination} [{}]", attrs.join(", ")))
    }
}
