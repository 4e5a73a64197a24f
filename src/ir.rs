use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    #[default]
    Solid,
    Dashed,
    Double,
    DoubleDotted,
}

impl EdgeType {
    /// Unknown tokens fall back to `Solid`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "dashed" => Self::Dashed,
            "double" => Self::Double,
            "double-dotted" | "double_dotted" | "doubledotted" => Self::DoubleDotted,
            _ => Self::Solid,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
            Self::Double => "double",
            Self::DoubleDotted => "double-dotted",
        }
    }

    pub fn arrow_start(self) -> bool {
        matches!(self, Self::Double | Self::DoubleDotted)
    }

    pub fn arrow_end(self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
}

impl Cluster {
    pub fn key(&self) -> String {
        identity_key(&self.label, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub cluster_id: Option<String>,
}

impl Node {
    pub fn key(&self) -> String {
        identity_key(&self.label, self.name.as_deref())
    }

    /// Text used when the node is referenced from an edge line.
    pub fn reference(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub edge_type: EdgeType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub clusters: Vec<Cluster>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn cluster(&self, id: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }

    /// Nodes whose `cluster_id` is `cluster_id`, in graph order.
    pub fn members<'a>(&'a self, cluster_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.cluster_id.as_deref() == Some(cluster_id))
    }

    /// Length of the `parent_id` chain above `cluster_id`. A chain that
    /// revisits a cluster is cut at the repeat.
    pub fn depth(&self, cluster_id: &str) -> usize {
        let mut depth = 0;
        let mut seen = vec![cluster_id.to_string()];
        let mut current = self.cluster(cluster_id).and_then(|c| c.parent_id.clone());
        while let Some(parent) = current {
            if seen.contains(&parent) {
                break;
            }
            let Some(cluster) = self.cluster(&parent) else {
                break;
            };
            depth += 1;
            seen.push(parent);
            current = cluster.parent_id.clone();
        }
        depth
    }
}

/// Case-insensitive identity used to match entities across re-parses.
pub fn identity_key(label: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.trim().to_lowercase(),
        _ => label.trim().to_lowercase(),
    }
}

pub fn slugify(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
