//! Boundary to an optional external parsing service.
//!
//! The service is best effort. Any failure is reported as a [`RemoteError`]
//! and the caller keeps its locally parsed graph.

use crate::ir::{Cluster, Edge, Graph, Node};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote parser unavailable: {0}")]
    Transport(String),
    #[error("remote response is missing the `{0}` array")]
    MissingField(&'static str),
    #[error("remote response is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("remote graph is invalid: {0}")]
    Invalid(String),
}

/// A service that turns prompt text into a JSON graph document with
/// `clusters`, `nodes` and `edges` arrays.
pub trait RemoteParser {
    fn parse(&self, text: &str) -> Result<Value, RemoteError>;
}

impl<F> RemoteParser for F
where
    F: Fn(&str) -> Result<Value, RemoteError>,
{
    fn parse(&self, text: &str) -> Result<Value, RemoteError> {
        self(text)
    }
}

fn take_array(value: &mut Value, field: &'static str) -> Result<Value, RemoteError> {
    match value.get_mut(field) {
        Some(array @ Value::Array(_)) => Ok(array.take()),
        _ => Err(RemoteError::MissingField(field)),
    }
}

/// Decodes a service response. All three arrays must be present, each entry
/// must match the graph data model, ids must be unique per collection and
/// `parentId` links must not form a cycle.
pub fn decode_remote_response(mut value: Value) -> Result<Graph, RemoteError> {
    let clusters = take_array(&mut value, "clusters")?;
    let nodes = take_array(&mut value, "nodes")?;
    let edges = take_array(&mut value, "edges")?;
    let graph = Graph {
        clusters: serde_json::from_value::<Vec<Cluster>>(clusters)?,
        nodes: serde_json::from_value::<Vec<Node>>(nodes)?,
        edges: serde_json::from_value::<Vec<Edge>>(edges)?,
    };
    check_structure(&graph)?;
    Ok(graph)
}

fn check_structure(graph: &Graph) -> Result<(), RemoteError> {
    let mut cluster_ids = HashSet::new();
    for cluster in &graph.clusters {
        if !cluster_ids.insert(cluster.id.as_str()) {
            return Err(RemoteError::Invalid(format!("duplicate cluster id `{}`", cluster.id)));
        }
    }
    let mut node_ids = HashSet::new();
    for node in &graph.nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(RemoteError::Invalid(format!("duplicate node id `{}`", node.id)));
        }
    }

    let parents: HashMap<&str, &str> = graph
        .clusters
        .iter()
        .filter_map(|c| c.parent_id.as_deref().map(|parent| (c.id.as_str(), parent)))
        .collect();
    for cluster in &graph.clusters {
        let mut seen = HashSet::from([cluster.id.as_str()]);
        let mut current = cluster.id.as_str();
        while let Some(&parent) = parents.get(current) {
            if !seen.insert(parent) {
                return Err(RemoteError::Invalid(format!("cluster `{parent}` is its own ancestor")));
            }
            current = parent;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::EdgeType;
    use serde_json::json;

    #[test]
    fn decodes_complete_response() {
        let graph = decode_remote_response(json!({
            "clusters": [{"id": "a", "label": "A"}],
            "nodes": [{"id": "x-1", "label": "X", "x": 10, "y": 20, "clusterId": "a"}],
            "edges": [{"id": "edge-1", "from": "x-1", "to": "x-1", "type": "dashed", "label": "self"}]
        }))
        .unwrap();
        assert_eq!(graph.clusters[0].parent_id, None);
        assert_eq!(graph.nodes[0].cluster_id.as_deref(), Some("a"));
        assert_eq!((graph.nodes[0].x, graph.nodes[0].y), (10.0, 20.0));
        assert_eq!(graph.edges[0].edge_type, EdgeType::Dashed);
    }

    #[test]
    fn missing_array_is_reported_by_name() {
        let err = decode_remote_response(json!({"clusters": [], "nodes": []})).unwrap_err();
        assert!(matches!(err, RemoteError::MissingField("edges")));
        let err = decode_remote_response(json!({"clusters": {}, "nodes": [], "edges": []})).unwrap_err();
        assert!(matches!(err, RemoteError::MissingField("clusters")));
    }

    #[test]
    fn wrong_entry_shape_is_malformed() {
        let err = decode_remote_response(json!({"clusters": [], "nodes": [{"label": 3}], "edges": []}))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[test]
    fn repeated_ids_are_invalid() {
        let err = decode_remote_response(json!({
            "clusters": [{"id": "z", "label": "Zone"}, {"id": "z", "label": "Other"}],
            "nodes": [],
            "edges": []
        }))
        .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(ref msg) if msg.contains("cluster id `z`")));

        let err = decode_remote_response(json!({
            "clusters": [],
            "nodes": [{"id": "n", "label": "X"}, {"id": "n", "label": "Y"}],
            "edges": [{"id": "e", "from": "n", "to": "n"}]
        }))
        .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(ref msg) if msg.contains("node id `n`")));
    }

    #[test]
    fn parent_cycles_are_invalid() {
        let err = decode_remote_response(json!({
            "clusters": [
                {"id": "a", "label": "A", "parentId": "b"},
                {"id": "b", "label": "B", "parentId": "a"}
            ],
            "nodes": [],
            "edges": []
        }))
        .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(_)));

        let err = decode_remote_response(json!({
            "clusters": [{"id": "a", "label": "A", "parentId": "a"}],
            "nodes": [],
            "edges": []
        }))
        .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(_)));

        // A parent that does not exist is not a cycle; merge clears it.
        let graph = decode_remote_response(json!({
            "clusters": [{"id": "a", "label": "A", "parentId": "ghost"}],
            "nodes": [],
            "edges": []
        }))
        .unwrap();
        assert_eq!(graph.clusters.len(), 1);
    }

    #[test]
    fn closures_act_as_parsers() {
        let offline = |_: &str| -> Result<Value, RemoteError> { Err(RemoteError::Transport("offline".into())) };
        assert!(matches!(offline.parse("Node: A"), Err(RemoteError::Transport(_))));
    }
}
