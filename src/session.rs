//! Live editing state.
//!
//! A [`Session`] owns the current graph and prompt text. Every change, whether
//! it comes from new text, a remote parse or an interactive edit, builds a new
//! graph and swaps it in whole. Each swap that supersedes the previous input
//! bumps the generation so late remote responses can be recognised as stale.

use crate::config::Config;
use crate::ir::{Edge, EdgeType, Graph, Node, slugify};
use crate::layout::{ClusterBounds, FixedAnchor, RoutedEdge, cluster_bounds, compute_layout, route_all};
use crate::parser::parse_with;
use crate::reconcile::{merge, place_new_node, unique_id};
use crate::regenerate::regenerate_prompt;
use crate::remote::{RemoteError, RemoteParser, decode_remote_response};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashSet;

/// Identifies the text a remote request was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub text: String,
}

#[derive(Debug)]
pub enum RemoteStatus {
    Applied,
    /// A newer update landed first; the response was ignored.
    Stale,
    /// The service failed; the local result stays in effect.
    Unavailable(RemoteError),
}

#[derive(Debug, Default)]
pub struct Session {
    config: Config,
    graph: Graph,
    prompt: String,
    generation: u64,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Starts from a saved graph; the prompt is regenerated from it.
    pub fn with_graph(graph: Graph, config: Config) -> Self {
        let prompt = regenerate_prompt(&graph);
        Self {
            config,
            graph,
            prompt,
            generation: 0,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn commit(&mut self, graph: Graph, prompt: Option<String>) {
        self.prompt = prompt.unwrap_or_else(|| regenerate_prompt(&graph));
        self.graph = graph;
        self.generation += 1;
        debug!(
            "generation {}: {} clusters, {} nodes, {} edges",
            self.generation,
            self.graph.clusters.len(),
            self.graph.nodes.len(),
            self.graph.edges.len()
        );
    }

    fn reconcile(&self, parsed: &Graph) -> Graph {
        let layout = &self.config.layout;
        let merged = merge(parsed, &self.graph.nodes, &self.graph.clusters, layout);
        compute_layout(&merged, None, layout)
    }

    /// Parses `text`, reconciles it with the live graph and lays it out.
    pub fn update_from_text(&mut self, text: &str) -> Ticket {
        let parsed = parse_with(text, &self.graph.nodes, &self.config.layout);
        let graph = self.reconcile(&parsed);
        self.commit(graph, Some(text.to_string()));
        Ticket {
            generation: self.generation,
            text: text.to_string(),
        }
    }

    /// Replaces the local result with a remote one, unless the ticket is
    /// stale or the response is unusable.
    pub fn apply_remote(&mut self, ticket: &Ticket, response: Result<Value, RemoteError>) -> RemoteStatus {
        if ticket.generation != self.generation {
            debug!(
                "ignoring remote result for generation {} (now {})",
                ticket.generation, self.generation
            );
            return RemoteStatus::Stale;
        }
        let parsed = match response.and_then(decode_remote_response) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("keeping local parse: {err}");
                return RemoteStatus::Unavailable(err);
            }
        };
        self.graph = self.reconcile(&parsed);
        debug!("applied remote parse for generation {}", self.generation);
        RemoteStatus::Applied
    }

    /// Local update first, then one synchronous attempt at the remote parser.
    pub fn refresh_remote(&mut self, text: &str, parser: &dyn RemoteParser) -> RemoteStatus {
        let ticket = self.update_from_text(text);
        let response = parser.parse(&ticket.text);
        self.apply_remote(&ticket, response)
    }

    pub fn routes(&self) -> Vec<RoutedEdge> {
        route_all(&self.graph, &self.config)
    }

    pub fn bounds(&self) -> Vec<ClusterBounds> {
        cluster_bounds(&self.graph, &self.config.layout)
    }

    /// Final position of a dragged node.
    pub fn move_node(&mut self, id: &str, x: f32, y: f32) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        let nodes = self
            .graph
            .nodes
            .iter()
            .map(|node| if node.id == id { Node { x, y, ..node.clone() } } else { node.clone() })
            .collect();
        let graph = Graph {
            nodes,
            ..self.graph.clone()
        };
        self.commit(graph, None);
        true
    }

    /// Drops a cluster near `(x, y)` and repacks everything else around it.
    pub fn move_cluster(&mut self, id: &str, x: f32, y: f32) -> bool {
        if self.graph.cluster(id).is_none() {
            return false;
        }
        let anchor = FixedAnchor {
            cluster_id: id.to_string(),
            x,
            y,
        };
        let graph = compute_layout(&self.graph, Some(&anchor), &self.config.layout);
        self.commit(graph, None);
        true
    }

    /// Adds a node and returns its id. An unknown cluster leaves it floating.
    pub fn add_node(&mut self, label: &str, name: Option<&str>, cluster_id: Option<&str>) -> String {
        let name = name.map(str::trim).filter(|name| !name.is_empty()).map(str::to_string);
        let cluster_id = cluster_id.filter(|id| self.graph.cluster(id).is_some()).map(str::to_string);
        let base = format!("{}-1", slugify(name.as_deref().unwrap_or(label)));
        let id = unique_id(&base, &HashSet::new(), self.graph.nodes.iter().map(|n| n.id.as_str()));
        let (x, y) = place_new_node(
            cluster_id.as_deref(),
            (self.config.layout.origin_x, self.config.layout.origin_y),
            self.graph.nodes.iter(),
            &self.graph.clusters,
            &self.config.layout,
        );
        let mut graph = self.graph.clone();
        graph.nodes.push(Node {
            id: id.clone(),
            label: label.trim().to_string(),
            name,
            x,
            y,
            cluster_id,
        });
        self.commit(graph, None);
        id
    }

    /// Removes a node together with every edge touching it.
    pub fn delete_node(&mut self, id: &str) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        let graph = Graph {
            clusters: self.graph.clusters.clone(),
            nodes: self.graph.nodes.iter().filter(|n| n.id != id).cloned().collect(),
            edges: self
                .graph
                .edges
                .iter()
                .filter(|e| e.from != id && e.to != id)
                .cloned()
                .collect(),
        };
        self.commit(graph, None);
        true
    }

    pub fn rename_node(&mut self, id: &str, label: &str, name: Option<&str>) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        let name = name.map(str::trim).filter(|name| !name.is_empty()).map(str::to_string);
        let nodes = self
            .graph
            .nodes
            .iter()
            .map(|node| {
                if node.id == id {
                    Node {
                        label: label.trim().to_string(),
                        name: name.clone(),
                        ..node.clone()
                    }
                } else {
                    node.clone()
                }
            })
            .collect();
        let graph = Graph {
            nodes,
            ..self.graph.clone()
        };
        self.commit(graph, None);
        true
    }

    /// Connects two existing nodes; returns the new edge id.
    pub fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType, label: Option<&str>) -> Option<String> {
        if self.graph.node(from).is_none() || self.graph.node(to).is_none() {
            return None;
        }
        let id = unique_id("edge-1", &HashSet::new(), self.graph.edges.iter().map(|e| e.id.as_str()));
        let mut graph = self.graph.clone();
        graph.edges.push(Edge {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            label: label.filter(|label| !label.is_empty()).map(str::to_string),
            edge_type,
        });
        self.commit(graph, None);
        Some(id)
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        if !self.graph.edges.iter().any(|e| e.id == id) {
            return false;
        }
        let graph = Graph {
            edges: self.graph.edges.iter().filter(|e| e.id != id).cloned().collect(),
            ..self.graph.clone()
        };
        self.commit(graph, None);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(text: &str) -> Session {
        let mut session = Session::new(Config::default());
        session.update_from_text(text);
        session
    }

    fn id_of(session: &Session, label: &str) -> String {
        session
            .graph()
            .nodes
            .iter()
            .find(|n| n.label == label)
            .map(|n| n.id.clone())
            .unwrap()
    }

    #[test]
    fn text_updates_keep_ids_and_bump_generation() {
        let mut s = session("Cluster: A\n  Node: X\nX -> Y");
        let x = id_of(&s, "X");
        assert_eq!(s.generation(), 1);
        let ticket = s.update_from_text("Cluster: A\n  Node: X\n  Node: Z\nX -> Z");
        assert_eq!(ticket.generation, 2);
        assert_eq!(id_of(&s, "X"), x);
        assert!(s.graph().nodes.iter().all(|n| n.label != "Y"));
        assert_eq!(s.prompt(), "Cluster: A\n  Node: X\n  Node: Z\nX -> Z");
    }

    #[test]
    fn remote_result_replaces_local_one() {
        let mut s = Session::new(Config::default());
        let ticket = s.update_from_text("Node: Web");
        let web = id_of(&s, "Web");
        let response = json!({
            "clusters": [{"id": "tier", "label": "Tier"}],
            "nodes": [
                {"id": "r1", "label": "Web", "clusterId": "tier"},
                {"id": "r2", "label": "Db", "clusterId": "tier"}
            ],
            "edges": [{"id": "e1", "from": "r1", "to": "r2"}]
        });
        assert!(matches!(s.apply_remote(&ticket, Ok(response)), RemoteStatus::Applied));
        assert_eq!(s.graph().nodes.len(), 2);
        assert_eq!(id_of(&s, "Web"), web);
        assert_eq!(s.graph().edges[0].from, web);
        assert_eq!(s.prompt(), "Node: Web");
    }

    #[test]
    fn stale_and_failed_responses_keep_local_result() {
        let mut s = Session::new(Config::default());
        let old = s.update_from_text("Node: A");
        s.update_from_text("Node: B");
        let before = s.graph().clone();
        let late = json!({"clusters": [], "nodes": [{"id": "a", "label": "A"}], "edges": []});
        assert!(matches!(s.apply_remote(&old, Ok(late)), RemoteStatus::Stale));
        assert_eq!(s.graph(), &before);

        let current = Ticket {
            generation: s.generation(),
            text: "Node: B".into(),
        };
        let status = s.apply_remote(&current, Ok(json!({"nodes": []})));
        assert!(matches!(status, RemoteStatus::Unavailable(RemoteError::MissingField(_))));
        let status = s.apply_remote(&current, Err(RemoteError::Transport("timeout".into())));
        assert!(matches!(status, RemoteStatus::Unavailable(RemoteError::Transport(_))));
        assert_eq!(s.graph(), &before);
    }

    #[test]
    fn structurally_invalid_responses_keep_local_result() {
        let mut s = Session::new(Config::default());
        let ticket = s.update_from_text("Cluster: A\n  Node: X");
        let before = s.graph().clone();

        let cyclic = json!({
            "clusters": [
                {"id": "a", "label": "A", "parentId": "b"},
                {"id": "b", "label": "B", "parentId": "a"}
            ],
            "nodes": [],
            "edges": []
        });
        let status = s.apply_remote(&ticket, Ok(cyclic));
        assert!(matches!(status, RemoteStatus::Unavailable(RemoteError::Invalid(_))));
        assert_eq!(s.graph(), &before);

        let duplicated = json!({
            "clusters": [{"id": "z", "label": "Zone"}, {"id": "z", "label": "Other"}],
            "nodes": [{"id": "n", "label": "X", "clusterId": "z"}, {"id": "n", "label": "Y"}],
            "edges": [{"id": "e", "from": "n", "to": "n"}]
        });
        let status = s.apply_remote(&ticket, Ok(duplicated));
        assert!(matches!(status, RemoteStatus::Unavailable(RemoteError::Invalid(_))));
        assert_eq!(s.graph(), &before);
        assert_eq!(s.generation(), ticket.generation);
    }

    #[test]
    fn refresh_runs_local_pass_before_remote() {
        let mut s = Session::new(Config::default());
        let offline = |_: &str| -> Result<Value, RemoteError> { Err(RemoteError::Transport("down".into())) };
        let status = s.refresh_remote("A -> B", &offline);
        assert!(matches!(status, RemoteStatus::Unavailable(_)));
        assert_eq!(s.graph().edges.len(), 1);
    }

    #[test]
    fn deleting_a_node_drops_its_edges_and_rewrites_prompt() {
        let mut s = session("A -> B\nB -> C\nC -> A");
        let b = id_of(&s, "B");
        assert!(s.delete_node(&b));
        assert_eq!(s.graph().nodes.len(), 2);
        assert_eq!(s.graph().edges.len(), 1);
        assert_eq!(s.prompt(), "Node: A\nNode: C\nC -> A");
        assert!(!s.delete_node(&b));
    }

    #[test]
    fn add_and_rename_nodes() {
        let mut s = session("Cluster: Rack\n  Node: Server");
        let rack = s.graph().clusters[0].id.clone();
        let id = s.add_node("Switch", None, Some(&rack));
        assert_eq!(id, "switch-1");
        let switch = s.graph().node(&id).unwrap().clone();
        assert_eq!(switch.cluster_id.as_deref(), Some(rack.as_str()));
        let server = s.graph().node(&id_of(&s, "Server")).unwrap().clone();
        assert_ne!((switch.x, switch.y), (server.x, server.y));

        let again = s.add_node("Switch", None, None);
        assert_eq!(again, "switch-2");
        assert!(s.rename_node(&again, "Spare Switch", Some("spare")));
        assert!(s.prompt().contains("Node: Spare Switch [name=spare]"));
    }

    #[test]
    fn edges_are_added_and_removed() {
        let mut s = session("Node: A\nNode: B");
        let (a, b) = (id_of(&s, "A"), id_of(&s, "B"));
        assert_eq!(s.add_edge(&a, "missing", EdgeType::Solid, None), None);
        let edge = s.add_edge(&a, &b, EdgeType::Dashed, Some("sync")).unwrap();
        assert!(s.prompt().ends_with("A -> B [arrow=dashed, label='sync']"));
        assert_eq!(s.routes().len(), 1);
        assert!(s.delete_edge(&edge));
        assert!(s.graph().edges.is_empty());
    }

    #[test]
    fn moves_commit_new_positions() {
        let mut s = session("Cluster: A\n  Node: X\nCluster: B\n  Node: Y\nNode: Free");
        let free = id_of(&s, "Free");
        assert!(s.move_node(&free, 900.0, 900.0));
        let node = s.graph().node(&free).unwrap();
        assert_eq!((node.x, node.y), (900.0, 900.0));

        let b = s.graph().clusters[1].clone();
        let a = s.graph().clusters[0].clone();
        assert!(s.move_cluster(&b.id, a.x.unwrap(), a.y.unwrap()));
        let moved = s.graph().cluster(&b.id).unwrap();
        assert_eq!((moved.x, moved.y), (a.x, a.y));
        assert!(!s.move_cluster("nope", 0.0, 0.0));
        assert_eq!(s.bounds().len(), 2);
    }
}
