use crate::config::Config;
use crate::ir::Graph;
use crate::layout::{ClusterBounds, RoutedEdge, cluster_bounds, route_all};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Everything a front end needs to draw the diagram. The graph fields are
/// flattened so a dump can be read back as a plain graph.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    #[serde(flatten)]
    pub graph: Graph,
    pub bounds: Vec<ClusterBounds>,
    pub routes: Vec<RoutedEdge>,
    pub width: f32,
    pub height: f32,
}

impl LayoutDump {
    pub fn from_graph(graph: &Graph, config: &Config) -> Self {
        let bounds = cluster_bounds(graph, &config.layout);
        let routes = route_all(graph, config);

        let half = config.layout.icon_size / 2.0;
        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        for rect in bounds.iter().map(|b| &b.rect) {
            width = width.max(rect.right());
            height = height.max(rect.bottom());
        }
        for node in &graph.nodes {
            width = width.max(node.x + half);
            height = height.max(node.y + half);
        }
        for point in routes.iter().flat_map(|r| r.route.points.iter()) {
            width = width.max(point.0);
            height = height.max(point.1);
        }

        LayoutDump {
            graph: graph.clone(),
            bounds,
            routes,
            width: width + config.layout.origin_x,
            height: height + config.layout.origin_y,
        }
    }
}

pub fn write_layout_dump<W: Write>(writer: W, dump: &LayoutDump) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, dump)?;
    Ok(())
}

pub fn write_layout_dump_file(path: &Path, dump: &LayoutDump) -> anyhow::Result<()> {
    let file = File::create(path)?;
    write_layout_dump(BufWriter::new(file), dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute_layout;
    use crate::parser::parse;
    use crate::reconcile::merge;

    #[test]
    fn dump_reads_back_as_a_graph() {
        let config = Config::default();
        let merged = merge(&parse("Cluster: A\n  Node: X\nX -> Y [label='go']"), &[], &[], &config.layout);
        let graph = compute_layout(&merged, None, &config.layout);
        let dump = LayoutDump::from_graph(&graph, &config);
        assert_eq!(dump.bounds.len(), 1);
        assert_eq!(dump.routes.len(), 1);
        assert!(dump.width > dump.bounds[0].rect.right());

        let mut out = Vec::new();
        write_layout_dump(&mut out, &dump).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value["routes"][0]["route"]["labelAnchor"].is_array());
        let back: Graph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);
    }
}
