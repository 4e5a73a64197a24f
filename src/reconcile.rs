//! Merges a fresh parse with the live graph.
//!
//! The parse decides which entities exist; the live graph only contributes ids
//! and positions for entities whose identity key survives. Edges are never
//! merged, they are rebuilt from the parse every time.

use crate::config::LayoutConfig;
use crate::ir::{Cluster, Edge, Graph, Node};
use crate::layout::placement::{free_slot, place_near};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Reconciles `parsed` against the previous nodes and clusters.
///
/// When several previous entities share an identity key, the first one in
/// collection order is the match. When several parsed entities share a key,
/// only the first one inherits; the rest are treated as new.
pub fn merge(
    parsed: &Graph,
    existing_nodes: &[Node],
    existing_clusters: &[Cluster],
    config: &LayoutConfig,
) -> Graph {
    let mut used_ids: HashSet<String> = HashSet::new();
    let (clusters, cluster_map) = merge_clusters(parsed, existing_clusters, &mut used_ids);
    let (nodes, node_map) = merge_nodes(parsed, existing_nodes, &clusters, &cluster_map, config);

    let mut edges = Vec::with_capacity(parsed.edges.len());
    for edge in &parsed.edges {
        let (Some(from), Some(to)) = (node_map.get(&edge.from), node_map.get(&edge.to)) else {
            warn!("dropping edge {} with an unknown endpoint", edge.id);
            continue;
        };
        edges.push(Edge {
            id: edge.id.clone(),
            from: from.clone(),
            to: to.clone(),
            label: edge.label.clone(),
            edge_type: edge.edge_type,
        });
    }

    Graph {
        clusters,
        nodes,
        edges,
    }
}

fn merge_clusters(
    parsed: &Graph,
    existing: &[Cluster],
    used_ids: &mut HashSet<String>,
) -> (Vec<Cluster>, HashMap<String, String>) {
    let mut by_label: HashMap<String, &Cluster> = HashMap::new();
    for cluster in existing {
        by_label.entry(cluster.key()).or_insert(cluster);
    }

    // The whole remap table is built first so parent links can point forward.
    let mut remap: HashMap<String, String> = HashMap::new();
    let mut inherited: HashMap<String, &Cluster> = HashMap::new();
    let mut claimed: HashSet<&str> = HashSet::new();
    for cluster in &parsed.clusters {
        let matched = by_label
            .get(&cluster.key())
            .copied()
            .filter(|old| !claimed.contains(old.id.as_str()));
        let final_id = match matched {
            Some(old) => {
                claimed.insert(old.id.as_str());
                inherited.insert(cluster.id.clone(), old);
                old.id.clone()
            }
            None => unique_id(&cluster.id, used_ids, existing.iter().map(|c| c.id.as_str())),
        };
        used_ids.insert(final_id.clone());
        remap.insert(cluster.id.clone(), final_id);
    }

    let mut clusters: Vec<Cluster> = parsed
        .clusters
        .iter()
        .map(|cluster| {
            let old = inherited.get(&cluster.id);
            Cluster {
                id: remap[&cluster.id].clone(),
                label: cluster.label.clone(),
                parent_id: cluster
                    .parent_id
                    .as_ref()
                    .and_then(|parent| remap.get(parent).cloned()),
                x: old.and_then(|old| old.x).or(cluster.x),
                y: old.and_then(|old| old.y).or(cluster.y),
            }
        })
        .collect();
    cut_parent_cycles(&mut clusters);
    debug!(
        "merged clusters: {} kept, {} new, {} dropped",
        inherited.len(),
        clusters.len() - inherited.len(),
        existing.len().saturating_sub(inherited.len())
    );
    (clusters, remap)
}

/// Clears the parent link that closes a cycle, so every `parent_id` chain
/// ends at a root.
fn cut_parent_cycles(clusters: &mut [Cluster]) {
    let index: HashMap<String, usize> = clusters
        .iter()
        .enumerate()
        .map(|(idx, cluster)| (cluster.id.clone(), idx))
        .collect();
    for start in 0..clusters.len() {
        let mut seen = HashSet::from([start]);
        let mut current = start;
        while let Some(up) = clusters[current].parent_id.as_deref().and_then(|id| index.get(id).copied()) {
            if !seen.insert(up) {
                warn!("cutting cyclic parent link of cluster {}", clusters[current].id);
                clusters[current].parent_id = None;
                break;
            }
            current = up;
        }
    }
}

fn merge_nodes(
    parsed: &Graph,
    existing: &[Node],
    clusters: &[Cluster],
    cluster_map: &HashMap<String, String>,
    config: &LayoutConfig,
) -> (Vec<Node>, HashMap<String, String>) {
    let mut by_key: HashMap<String, &Node> = HashMap::new();
    for node in existing {
        by_key.entry(node.key()).or_insert(node);
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut merged: Vec<Option<Node>> = Vec::with_capacity(parsed.nodes.len());
    let mut used_ids: HashSet<String> = HashSet::new();
    for node in &parsed.nodes {
        let cluster_id = node
            .cluster_id
            .as_ref()
            .and_then(|id| cluster_map.get(id).cloned());
        let matched = by_key
            .get(&node.key())
            .copied()
            .filter(|old| !claimed.contains(old.id.as_str()));
        match matched {
            Some(old) => {
                claimed.insert(old.id.as_str());
                used_ids.insert(old.id.clone());
                merged.push(Some(Node {
                    id: old.id.clone(),
                    label: node.label.clone(),
                    name: node.name.clone(),
                    x: old.x,
                    y: old.y,
                    cluster_id,
                }));
            }
            None => merged.push(None),
        }
    }
    let kept = merged.iter().filter(|node| node.is_some()).count();

    // New nodes are placed only after every surviving node holds its slot.
    let mut node_map: HashMap<String, String> = HashMap::new();
    for (idx, node) in parsed.nodes.iter().enumerate() {
        if let Some(done) = &merged[idx] {
            node_map.insert(node.id.clone(), done.id.clone());
            continue;
        }
        let id = unique_id(&node.id, &used_ids, existing.iter().map(|n| n.id.as_str()));
        used_ids.insert(id.clone());
        let cluster_id = node
            .cluster_id
            .as_ref()
            .and_then(|id| cluster_map.get(id).cloned());
        let (x, y) = place_new_node(
            cluster_id.as_deref(),
            (node.x, node.y),
            merged.iter().flatten(),
            clusters,
            config,
        );
        node_map.insert(node.id.clone(), id.clone());
        merged[idx] = Some(Node {
            id,
            label: node.label.clone(),
            name: node.name.clone(),
            x,
            y,
            cluster_id,
        });
    }

    let nodes: Vec<Node> = merged.into_iter().flatten().collect();
    debug!(
        "merged nodes: {} kept, {} new, {} dropped",
        kept,
        nodes.len() - kept,
        existing.len().saturating_sub(kept)
    );
    (nodes, node_map)
}

/// Free lattice position for a node joining `cluster_id`, given the nodes
/// already placed. Clustered nodes go near their cluster, others take the
/// first free canvas slot.
pub(crate) fn place_new_node<'a>(
    cluster_id: Option<&str>,
    fallback: (f32, f32),
    placed: impl Iterator<Item = &'a Node> + Clone,
    clusters: &[Cluster],
    config: &LayoutConfig,
) -> (f32, f32) {
    let occupied: Vec<(f32, f32)> = placed.clone().map(|n| (n.x, n.y)).collect();
    match cluster_id {
        Some(cluster) => {
            let target = cluster_target(cluster, placed, clusters).unwrap_or(fallback);
            place_near(target, &occupied, config)
        }
        None => free_slot(&occupied, config),
    }
}

/// Centroid of the cluster's placed members, else its anchor.
fn cluster_target<'a>(
    cluster_id: &str,
    placed: impl Iterator<Item = &'a Node>,
    clusters: &[Cluster],
) -> Option<(f32, f32)> {
    let members: Vec<(f32, f32)> = placed
        .filter(|node| node.cluster_id.as_deref() == Some(cluster_id))
        .map(|node| (node.x, node.y))
        .collect();
    if !members.is_empty() {
        let count = members.len() as f32;
        let sx: f32 = members.iter().map(|p| p.0).sum();
        let sy: f32 = members.iter().map(|p| p.1).sum();
        return Some((sx / count, sy / count));
    }
    let cluster = clusters.iter().find(|cluster| cluster.id == cluster_id)?;
    Some((cluster.x?, cluster.y?))
}

/// `base` if it is free, otherwise `base` with its numeric suffix bumped
/// until it collides with neither `used` nor `reserved`.
pub(crate) fn unique_id<'a>(
    base: &str,
    used: &HashSet<String>,
    reserved: impl Iterator<Item = &'a str> + Clone,
) -> String {
    let taken = |candidate: &str| used.contains(candidate) || reserved.clone().any(|id| id == candidate);
    if !taken(base) {
        return base.to_string();
    }
    let (stem, mut n) = match base.rsplit_once('-') {
        Some((stem, suffix)) if !stem.is_empty() => match suffix.parse::<usize>() {
            Ok(n) => (stem.to_string(), n),
            Err(_) => (base.to_string(), 1),
        },
        _ => (base.to_string(), 1),
    };
    loop {
        n += 1;
        let candidate = format!("{stem}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn config() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn node(id: &str, label: &str, name: Option<&str>, x: f32, y: f32, cluster: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            label: label.to_string(),
            name: name.map(str::to_string),
            x,
            y,
            cluster_id: cluster.map(str::to_string),
        }
    }

    fn cluster(id: &str, label: &str, parent: Option<&str>) -> Cluster {
        Cluster {
            id: id.to_string(),
            label: label.to_string(),
            parent_id: parent.map(str::to_string),
            x: None,
            y: None,
        }
    }

    #[test]
    fn alias_keeps_id_and_position_across_clusters() {
        let existing_nodes = vec![node("g-1", "Search", Some("g"), 100.0, 50.0, Some("a"))];
        let existing_clusters = vec![cluster("a", "A", None)];
        let parsed = parse("Cluster: A\nCluster: B\n  Node: Search Engine [name=g]");
        let merged = merge(&parsed, &existing_nodes, &existing_clusters, &config());
        assert_eq!(merged.nodes.len(), 1);
        let g = &merged.nodes[0];
        assert_eq!(g.id, "g-1");
        assert_eq!((g.x, g.y), (100.0, 50.0));
        assert_eq!(g.cluster_id.as_deref(), Some("b"));
        assert_eq!(g.label, "Search Engine");
    }

    #[test]
    fn clusters_absent_from_parse_are_dropped() {
        let first = merge(&parse("Cluster: A\n  Node: X\nCluster: B\n  Node: Y"), &[], &[], &config());
        let second = merge(&parse("Cluster: A\n  Node: X\nNode: Y"), &first.nodes, &first.clusters, &config());
        assert!(second.cluster("b").is_none());
        assert!(second.nodes.iter().all(|n| n.cluster_id.as_deref() != Some("b")));
        assert!(second.clusters.iter().all(|c| c.parent_id.as_deref() != Some("b")));
    }

    #[test]
    fn parent_links_follow_current_indentation() {
        let existing = vec![cluster("outer", "Outer", None), cluster("inner", "Inner", Some("outer"))];
        let merged = merge(&parse("Cluster: Inner\nCluster: Outer"), &[], &existing, &config());
        assert!(merged.clusters.iter().all(|c| c.parent_id.is_none()));

        let merged = merge(&parse("Cluster: Inner\n  Cluster: Outer"), &[], &existing, &config());
        assert_eq!(merged.cluster("outer").unwrap().parent_id.as_deref(), Some("inner"));
    }

    #[test]
    fn renamed_cluster_loses_continuity() {
        let first = merge(&parse("Cluster: Frontend\n  Node: Web"), &[], &[], &config());
        let renamed = merge(
            &parse("Cluster: Client\n  Node: Web"),
            &first.nodes,
            &first.clusters,
            &config(),
        );
        assert_eq!(renamed.clusters[0].id, "client");
        // The node itself still matches by label and keeps its id.
        assert_eq!(renamed.nodes[0].id, first.nodes[0].id);
        assert_eq!(renamed.nodes[0].cluster_id.as_deref(), Some("client"));

        let relabeled_case = merge(
            &parse("Cluster: FRONTEND\n  Node: Web"),
            &first.nodes,
            &first.clusters,
            &config(),
        );
        assert_eq!(relabeled_case.clusters[0].id, "frontend");
    }

    #[test]
    fn first_existing_match_wins_and_duplicates_become_new() {
        let existing = vec![
            node("db-1", "Db", None, 10.0, 10.0, None),
            node("db-2", "DB", None, 500.0, 500.0, None),
        ];
        let merged = merge(&parse("Node: Db\nNode: Db"), &existing, &[], &config());
        assert_eq!(merged.nodes[0].id, "db-1");
        assert_ne!(merged.nodes[1].id, "db-1");
        assert_ne!(merged.nodes[1].id, "db-2");
        assert_ne!((merged.nodes[1].x, merged.nodes[1].y), (10.0, 10.0));
    }

    #[test]
    fn edges_are_rewritten_through_the_node_map() {
        let existing = vec![node("api-9", "Api", None, 0.0, 0.0, None)];
        let merged = merge(&parse("Api -> Db [label='q']"), &existing, &[], &config());
        let edge = &merged.edges[0];
        assert_eq!(edge.from, "api-9");
        assert!(merged.node(&edge.to).is_some());
        assert_eq!(edge.label.as_deref(), Some("q"));
    }

    #[test]
    fn new_nodes_land_near_their_cluster() {
        let existing_nodes = vec![node("x-1", "X", None, 1000.0, 1000.0, Some("a"))];
        let existing_clusters = vec![cluster("a", "A", None)];
        let merged = merge(
            &parse("Cluster: A\n  Node: X\n  Node: Fresh"),
            &existing_nodes,
            &existing_clusters,
            &config(),
        );
        let fresh = merged.nodes.iter().find(|n| n.label == "Fresh").unwrap();
        let spacing = config().node_spacing();
        assert!((fresh.x - 1000.0).abs() <= spacing + 0.1);
        assert!((fresh.y - 1000.0).abs() <= spacing + 0.1);
        assert_ne!((fresh.x, fresh.y), (1000.0, 1000.0));
    }

    #[test]
    fn cyclic_parent_links_are_cut() {
        let parsed = Graph {
            clusters: vec![cluster("a", "A", Some("b")), cluster("b", "B", Some("a")), cluster("c", "C", Some("c"))],
            nodes: vec![node("x", "X", None, 0.0, 0.0, Some("a"))],
            edges: Vec::new(),
        };
        let merged = merge(&parsed, &[], &[], &config());
        assert_eq!(merged.clusters.len(), 3);
        assert!(merged.cluster("c").unwrap().parent_id.is_none());
        let roots = merged.clusters.iter().filter(|c| c.parent_id.is_none()).count();
        assert_eq!(roots, 2);
        for cluster in &merged.clusters {
            assert!(merged.depth(&cluster.id) < merged.clusters.len());
            let mut seen = HashSet::new();
            let mut current = Some(cluster.id.as_str());
            while let Some(id) = current {
                assert!(seen.insert(id), "cycle through {id}");
                current = merged.cluster(id).and_then(|c| c.parent_id.as_deref());
            }
        }
        assert_eq!(merged.nodes[0].cluster_id.as_deref(), Some("a"));
    }

    #[test]
    fn unique_id_bumps_numeric_suffix() {
        let used: HashSet<String> = ["db-1".to_string(), "db-2".to_string()].into_iter().collect();
        assert_eq!(unique_id("db-1", &used, std::iter::empty()), "db-3");
        assert_eq!(unique_id("zone", &used, ["zone"].into_iter()), "zone-2");
        assert_eq!(unique_id("free-1", &used, std::iter::empty()), "free-1");
    }

    #[test]
    fn merging_into_empty_state_keeps_parse_ids() {
        let parsed = parse("Cluster: A\n  Node: X\nX -> Y");
        let merged = merge(&parsed, &[], &[], &config());
        assert_eq!(merged.clusters[0].id, parsed.clusters[0].id);
        let ids: Vec<&str> = merged.nodes.iter().map(|n| n.id.as_str()).collect();
        let parsed_ids: Vec<&str> = parsed.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, parsed_ids);
    }
}
