use crate::config::LayoutConfig;
use crate::ir::{Cluster, Edge, EdgeType, Graph, Node, identity_key, slugify};
use crate::layout::placement::provisional_position;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static CLUSTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^cluster\s*:\s*(?P<label>.*?)\s*$").unwrap());
static NODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^node\s*:\s*(?P<label>.*?)\s*(?:\[\s*name\s*=\s*(?P<name>[^\]]*?)\s*\])?\s*$")
        .unwrap()
});
static EDGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<from>.+?)\s*->\s*(?P<to>[^\[]+?)\s*(?:\[(?P<attrs>.*)\])?\s*$").unwrap()
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<key>[a-z_-]+)\s*=\s*(?:'(?P<single>[^']*)'|"(?P<double>[^"]*)"|(?P<bare>[^,\]]*))"#,
    )
    .unwrap()
});

/// Where an edge reference points.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// A node already declared (or auto-created) in this parse, by parse id.
    Declared(String),
    /// A node only known from the prior graph.
    Known(&'a Node),
    /// Nothing matches; a node named after the reference must be created.
    Create(String),
}

/// Parses `text` without prior state.
pub fn parse(text: &str) -> Graph {
    parse_with_known(text, &[])
}

/// Parses `text`, resolving edge references against `known` nodes when they
/// are not declared in the text itself.
pub fn parse_with_known(text: &str, known: &[Node]) -> Graph {
    parse_with(text, known, &LayoutConfig::default())
}

pub fn parse_with(text: &str, known: &[Node], config: &LayoutConfig) -> Graph {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .filter_map(|raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || is_comment(trimmed) {
                return None;
            }
            Some((indent_of(raw), trimmed))
        })
        .collect();

    let mut builder = GraphBuilder::new(config);

    let mut stack: Vec<(usize, usize)> = Vec::new();
    for &(indent, line) in &lines {
        if let Some(caps) = CLUSTER_RE.captures(line) {
            let label = caps.name("label").map(|m| m.as_str()).unwrap_or("");
            if label.is_empty() {
                continue;
            }
            while stack.last().is_some_and(|&(_, top)| top >= indent) {
                stack.pop();
            }
            let parent = stack.last().map(|&(idx, _)| idx);
            let idx = builder.add_cluster(label, parent);
            stack.push((idx, indent));
            continue;
        }
        if let Some(caps) = NODE_RE.captures(line) {
            let label = caps.name("label").map(|m| m.as_str()).unwrap_or("");
            if label.is_empty() {
                continue;
            }
            let name = caps
                .name("name")
                .map(|m| unquote(m.as_str()).to_string())
                .filter(|name| !name.is_empty());
            let cluster = stack.last().map(|&(idx, _)| idx);
            builder.add_node(label, name, cluster);
        }
    }

    for &(_, line) in &lines {
        if CLUSTER_RE.is_match(line) || NODE_RE.is_match(line) {
            continue;
        }
        let Some((from, to, attrs)) = parse_edge_line(line) else {
            trace!("skipping unrecognized line: {line}");
            continue;
        };
        let from_id = builder.resolve_or_insert(from, known);
        let to_id = builder.resolve_or_insert(to, known);
        builder.add_edge(from_id, to_id, attrs);
    }

    let graph = builder.finish();
    debug!(
        "parsed {} clusters, {} nodes, {} edges",
        graph.clusters.len(),
        graph.nodes.len(),
        graph.edges.len()
    );
    graph
}

/// Looks `reference` up by alias, then label, first among `declared` and then
/// among `known`. The first match in collection order wins.
pub fn resolve_reference<'a>(reference: &str, declared: &[Node], known: &'a [Node]) -> Resolution<'a> {
    let wanted = reference.trim().to_lowercase();
    let by_alias = |node: &&Node| {
        node.name
            .as_deref()
            .is_some_and(|name| name.trim().to_lowercase() == wanted)
    };
    let by_label = |node: &&Node| node.label.trim().to_lowercase() == wanted;

    if let Some(node) = declared.iter().find(by_alias).or_else(|| declared.iter().find(by_label)) {
        return Resolution::Declared(node.id.clone());
    }
    if let Some(node) = known.iter().find(by_alias).or_else(|| known.iter().find(by_label)) {
        return Resolution::Known(node);
    }
    Resolution::Create(reference.trim().to_string())
}

#[derive(Debug, Default, PartialEq)]
struct EdgeAttrs {
    edge_type: EdgeType,
    label: Option<String>,
}

fn parse_edge_line(line: &str) -> Option<(&str, &str, EdgeAttrs)> {
    let caps = EDGE_RE.captures(line)?;
    let from = caps.name("from")?.as_str().trim();
    let to = caps.name("to")?.as_str().trim();
    if from.is_empty() || to.is_empty() {
        return None;
    }
    let attrs = caps
        .name("attrs")
        .map(|m| parse_attrs(m.as_str()))
        .unwrap_or_default();
    Some((from, to, attrs))
}

fn parse_attrs(raw: &str) -> EdgeAttrs {
    let mut values: HashMap<String, String> = HashMap::new();
    for caps in ATTR_RE.captures_iter(raw) {
        let Some(key) = caps.name("key") else {
            continue;
        };
        let value = caps
            .name("single")
            .or_else(|| caps.name("double"))
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str().trim())
            .unwrap_or("");
        values
            .entry(key.as_str().to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
    }

    let edge_type = values
        .get("arrow")
        .map(|token| EdgeType::from_token(token))
        .unwrap_or_default();
    // `lable` is a long-standing misspelling still found in saved prompts.
    let label = values
        .get("label")
        .filter(|value| !value.is_empty())
        .or_else(|| values.get("lable").filter(|value| !value.is_empty()))
        .cloned();
    EdgeAttrs { edge_type, label }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}

fn indent_of(raw: &str) -> usize {
    raw.chars().take_while(|ch| ch.is_whitespace()).count()
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with('#')
}

struct GraphBuilder<'c> {
    config: &'c LayoutConfig,
    clusters: Vec<Cluster>,
    nodes: Vec<Node>,
    /// Cluster index per node, parallel to `nodes`.
    node_clusters: Vec<Option<usize>>,
    edges: Vec<Edge>,
    seq: usize,
}

impl<'c> GraphBuilder<'c> {
    fn new(config: &'c LayoutConfig) -> Self {
        Self {
            config,
            clusters: Vec::new(),
            nodes: Vec::new(),
            node_clusters: Vec::new(),
            edges: Vec::new(),
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> usize {
        self.seq += 1;
        self.seq
    }

    fn add_cluster(&mut self, label: &str, parent: Option<usize>) -> usize {
        let base = slugify(label);
        let mut id = base.clone();
        let mut suffix = 2;
        while self.clusters.iter().any(|cluster| cluster.id == id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        let parent_id = parent.map(|idx| self.clusters[idx].id.clone());
        self.clusters.push(Cluster {
            id,
            label: label.to_string(),
            parent_id,
            x: None,
            y: None,
        });
        self.clusters.len() - 1
    }

    fn add_node(&mut self, label: &str, name: Option<String>, cluster: Option<usize>) -> String {
        let key = identity_key(label, name.as_deref());
        let id = format!("{}-{}", slugify(&key), self.next_seq());
        self.push_node(Node {
            id: id.clone(),
            label: label.to_string(),
            name,
            x: 0.0,
            y: 0.0,
            cluster_id: None,
        }, cluster);
        id
    }

    fn push_node(&mut self, mut node: Node, cluster: Option<usize>) {
        node.cluster_id = cluster.map(|idx| self.clusters[idx].id.clone());
        self.nodes.push(node);
        self.node_clusters.push(cluster);
    }

    fn resolve_or_insert(&mut self, reference: &str, known: &[Node]) -> String {
        match resolve_reference(reference, &self.nodes, known) {
            Resolution::Declared(id) => id,
            Resolution::Known(node) => {
                trace!("reference {reference:?} carries prior node {}", node.id);
                let mut carried = node.clone();
                carried.cluster_id = None;
                let id = carried.id.clone();
                self.push_node(carried, None);
                id
            }
            Resolution::Create(label) => {
                trace!("auto-creating node for reference {reference:?}");
                self.add_node(&label, None, None)
            }
        }
    }

    fn add_edge(&mut self, from: String, to: String, attrs: EdgeAttrs) {
        let id = format!("edge-{}", self.next_seq());
        self.edges.push(Edge {
            id,
            from,
            to,
            label: attrs.label,
            edge_type: attrs.edge_type,
        });
    }

    fn finish(mut self) -> Graph {
        let cluster_count = self.clusters.len();
        let mut member_counts = vec![0usize; cluster_count];
        let mut floating = 0usize;
        for (node, cluster) in self.nodes.iter_mut().zip(&self.node_clusters) {
            // Nodes carried from prior state already have a position.
            if node.x != 0.0 || node.y != 0.0 {
                continue;
            }
            let member_index = match cluster {
                Some(idx) => {
                    member_counts[*idx] += 1;
                    member_counts[*idx] - 1
                }
                None => {
                    floating += 1;
                    floating - 1
                }
            };
            let (x, y) = provisional_position(*cluster, cluster_count, member_index, self.config);
            node.x = x;
            node.y = y;
        }
        Graph {
            clusters: self.clusters,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}
