//! Canonical DSL text for a graph.
//!
//! The output parses back to the same entities: floating nodes come first
//! because a node line always joins the innermost open cluster, then every
//! cluster tree depth-first, then all edges.

use crate::ir::{Cluster, Edge, EdgeType, Graph, Node};
use std::collections::{HashMap, HashSet};

const INDENT: &str = "  ";

/// Writes `graph` back as DSL text.
///
/// Edge lines name each endpoint by its alias, or by its label when it has
/// none. Parsing resolves a reference by alias before label, so a node whose
/// label equals another node's alias (ignoring case) re-parses as that other
/// node.
pub fn regenerate_prompt(graph: &Graph) -> String {
    let mut lines: Vec<String> = Vec::new();
    let known_clusters: HashSet<&str> = graph.clusters.iter().map(|c| c.id.as_str()).collect();

    for node in &graph.nodes {
        let floating = node
            .cluster_id
            .as_deref()
            .is_none_or(|id| !known_clusters.contains(id));
        if floating {
            lines.push(format_node_line(node));
        }
    }

    let mut children: HashMap<&str, Vec<&Cluster>> = HashMap::new();
    let mut roots: Vec<&Cluster> = Vec::new();
    for cluster in &graph.clusters {
        match cluster.parent_id.as_deref().filter(|id| known_clusters.contains(id)) {
            Some(parent) => children.entry(parent).or_default().push(cluster),
            None => roots.push(cluster),
        }
    }

    let mut emitted: HashSet<&str> = HashSet::new();
    for &root in &roots {
        emit_cluster_tree(graph, root, &children, &mut emitted, &mut lines);
    }
    // Clusters caught in a parent cycle are unreachable from any root.
    for cluster in &graph.clusters {
        if !emitted.contains(cluster.id.as_str()) {
            emit_cluster_tree(graph, cluster, &children, &mut emitted, &mut lines);
        }
    }

    for edge in &graph.edges {
        if let Some(line) = format_edge_line(graph, edge) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

fn emit_cluster_tree<'g>(
    graph: &'g Graph,
    root: &'g Cluster,
    children: &HashMap<&'g str, Vec<&'g Cluster>>,
    emitted: &mut HashSet<&'g str>,
    lines: &mut Vec<String>,
) {
    let mut stack: Vec<(&Cluster, usize)> = vec![(root, 0)];
    while let Some((cluster, depth)) = stack.pop() {
        if !emitted.insert(cluster.id.as_str()) {
            continue;
        }
        lines.push(format!("{}Cluster: {}", INDENT.repeat(depth), cluster.label.trim()));
        let inner = INDENT.repeat(depth + 1);
        for node in graph.members(&cluster.id) {
            lines.push(format!("{inner}{}", format_node_line(node)));
        }
        if let Some(kids) = children.get(cluster.id.as_str()) {
            for child in kids.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
    }
}

fn format_node_line(node: &Node) -> String {
    match node.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Node: {} [name={}]", node.label.trim(), name),
        None => format!("Node: {}", node.label.trim()),
    }
}

fn format_edge_line(graph: &Graph, edge: &Edge) -> Option<String> {
    let from = graph.node(&edge.from)?.reference().trim();
    let to = graph.node(&edge.to)?.reference().trim();
    let mut attrs: Vec<String> = Vec::new();
    if edge.edge_type != EdgeType::Solid {
        attrs.push(format!("arrow={}", edge.edge_type.as_token()));
    }
    if let Some(label) = edge.label.as_deref().filter(|label| !label.is_empty()) {
        attrs.push(format!("label={}", quote(label)));
    }
    if attrs.is_empty() {
        Some(format!("{from} -> {to}"))
    } else {
        Some(format!("{from} -> {to} [{}]", attrs.join(", ")))
    }
}

/// Single quotes unless the label contains one. A label holding both quote
/// kinds loses its double quotes, since the grammar has no escapes.
pub(crate) fn quote(label: &str) -> String {
    if !label.contains('\'') {
        format!("'{label}'")
    } else {
        format!("\"{}\"", label.replace('"', ""))
    }
}
