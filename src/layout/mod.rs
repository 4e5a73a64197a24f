pub mod grid;
pub mod placement;
pub mod routing;
pub(crate) mod types;
pub use routing::{route_all, route_edge};
pub use types::*;

use crate::config::LayoutConfig;
use crate::ir::{Cluster, Graph, Node};
use grid::{GridShape, assign_cells, choose_grid};
use log::{debug, trace};
use placement::{cluster_cell_center, free_slot_from};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// Cluster tree over indices into a cluster slice. Parent links that are
/// dangling or close a cycle are cut, so every walk terminates.
struct ClusterArena {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    depth: Vec<usize>,
    /// Node indices per cluster, in node order.
    members: Vec<Vec<usize>>,
    /// Node indices without a (known) cluster.
    floating: Vec<usize>,
}

impl ClusterArena {
    fn build(clusters: &[Cluster], nodes: &[Node]) -> Self {
        let index: HashMap<&str, usize> = clusters
            .iter()
            .enumerate()
            .map(|(idx, cluster)| (cluster.id.as_str(), idx))
            .collect();
        let mut parent: Vec<Option<usize>> = clusters
            .iter()
            .map(|cluster| {
                cluster
                    .parent_id
                    .as_deref()
                    .and_then(|id| index.get(id).copied())
            })
            .collect();

        for start in 0..clusters.len() {
            let mut seen = HashSet::from([start]);
            let mut current = start;
            while let Some(up) = parent[current] {
                if !seen.insert(up) {
                    debug!("cutting cyclic parent link of cluster {}", clusters[current].id);
                    parent[current] = None;
                    break;
                }
                current = up;
            }
        }

        let mut children = vec![Vec::new(); clusters.len()];
        let mut roots = Vec::new();
        for (idx, up) in parent.iter().enumerate() {
            match up {
                Some(up) => children[*up].push(idx),
                None => roots.push(idx),
            }
        }

        let mut depth = vec![0usize; clusters.len()];
        let mut stack: Vec<usize> = roots.clone();
        while let Some(idx) = stack.pop() {
            for &child in &children[idx] {
                depth[child] = depth[idx] + 1;
                stack.push(child);
            }
        }

        let mut members = vec![Vec::new(); clusters.len()];
        let mut floating = Vec::new();
        for (node_idx, node) in nodes.iter().enumerate() {
            match node.cluster_id.as_deref().and_then(|id| index.get(id)) {
                Some(&cluster_idx) => members[cluster_idx].push(node_idx),
                None => floating.push(node_idx),
            }
        }

        Self {
            parent,
            children,
            roots,
            depth,
            members,
            floating,
        }
    }

    /// Deepest clusters first, so children are visited before their parents.
    fn post_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.parent.len()).collect();
        order.sort_by_key(|&idx| Reverse(self.depth[idx]));
        order
    }
}

#[derive(Debug, Clone, Copy)]
struct Measure {
    width: f32,
    height: f32,
    own_cols: usize,
    own_rows: usize,
    own_height: f32,
    children: GridShape,
    child_cell: (f32, f32),
    child_block: (f32, f32),
}

fn measure(arena: &ClusterArena, config: &LayoutConfig) -> Vec<Measure> {
    let spacing = config.node_spacing();
    let gap = config.cluster_gap;
    let pad = config.cluster_padding;
    let mut sizes: Vec<Option<Measure>> = vec![None; arena.parent.len()];

    for idx in arena.post_order() {
        let own = arena.members[idx].len();
        let (own_cols, own_rows) = if own == 0 {
            (0, 0)
        } else {
            let cols = (own as f32).sqrt().ceil() as usize;
            (cols, own.div_ceil(cols))
        };
        let own_width = own_cols as f32 * spacing;
        let own_height = own_rows as f32 * spacing;

        let kids = &arena.children[idx];
        let (children, child_cell, child_block) = if kids.is_empty() {
            (GridShape { cols: 0, rows: 0 }, (0.0, 0.0), (0.0, 0.0))
        } else {
            let max_w = kids.iter().filter_map(|&k| sizes[k]).map(|m| m.width).fold(0.0, f32::max);
            let max_h = kids.iter().filter_map(|&k| sizes[k]).map(|m| m.height).fold(0.0, f32::max);
            let cell = (max_w + gap, max_h + gap);
            let shape = choose_grid(kids.len(), cell.0, None);
            let block = (
                shape.cols as f32 * cell.0 - gap + config.depth_margin * 2.0,
                shape.rows as f32 * cell.1 - gap + config.depth_margin * 2.0,
            );
            (shape, cell, block)
        };

        let between = if own_height > 0.0 && child_block.1 > 0.0 { gap } else { 0.0 };
        let content_w = own_width.max(child_block.0);
        let content_h = own_height + between + child_block.1;
        sizes[idx] = Some(Measure {
            width: (content_w + pad * 2.0).max(config.empty_cluster_width),
            height: (content_h + pad * 2.0).max(config.empty_cluster_height),
            own_cols,
            own_rows,
            own_height,
            children,
            child_cell,
            child_block,
        });
    }
    sizes.into_iter().flatten().collect()
}

fn cell_center(origin: (f32, f32), cell: (f32, f32), gap: f32, shape: GridShape, index: usize) -> (f32, f32) {
    let col = index % shape.cols.max(1);
    let row = index / shape.cols.max(1);
    (
        origin.0 + col as f32 * cell.0 + (cell.0 - gap) / 2.0,
        origin.1 + row as f32 * cell.1 + (cell.1 - gap) / 2.0,
    )
}

/// Lays out clusters and their member nodes on a deterministic grid.
///
/// Sibling clusters share a near-square grid (roots on the canvas, children
/// inside their parent). Member nodes are moved with their cluster and then
/// packed into a square sub-grid so icons never overlap. Floating nodes keep
/// their position unless it collides with a cluster.
pub fn layout_clusters(
    clusters: &[Cluster],
    nodes: &[Node],
    fixed: Option<&FixedAnchor>,
    config: &LayoutConfig,
) -> (Vec<Cluster>, Vec<Node>) {
    if clusters.is_empty() {
        return (clusters.to_vec(), nodes.to_vec());
    }
    let arena = ClusterArena::build(clusters, nodes);
    let sizes = measure(&arena, config);
    let gap = config.cluster_gap;
    let pinned_idx = fixed.and_then(|anchor| clusters.iter().position(|c| c.id == anchor.cluster_id));

    let mut boxes: Vec<Rect> = vec![Rect::from_center(0.0, 0.0, 0.0, 0.0); clusters.len()];

    let root_cell = (
        arena.roots.iter().map(|&r| sizes[r].width).fold(0.0, f32::max) + gap,
        arena.roots.iter().map(|&r| sizes[r].height).fold(0.0, f32::max) + gap,
    );
    let root_shape = choose_grid(arena.roots.len(), root_cell.0, Some(config.canvas_width));
    debug!(
        "cluster grid: {} roots in {}x{} cells of {:.0}x{:.0}",
        arena.roots.len(),
        root_shape.cols,
        root_shape.rows,
        root_cell.0,
        root_cell.1
    );

    let mut levels: Vec<(Vec<usize>, (f32, f32), (f32, f32), GridShape)> = vec![(
        arena.roots.clone(),
        (config.origin_x, config.origin_y),
        root_cell,
        root_shape,
    )];
    while let Some((items, origin, cell, shape)) = levels.pop() {
        let pinned = pinned_idx
            .and_then(|p| items.iter().position(|&item| item == p))
            .zip(fixed.map(|anchor| (anchor.x, anchor.y)));
        let cells = assign_cells(items.len(), shape, pinned, |c| cell_center(origin, cell, gap, shape, c));
        for (&idx, &cell_idx) in items.iter().zip(&cells) {
            let (cx, cy) = cell_center(origin, cell, gap, shape, cell_idx);
            let size = sizes[idx];
            let rect = Rect::from_center(cx, cy, size.width, size.height);
            boxes[idx] = rect;
            if !arena.children[idx].is_empty() {
                let content_top = rect.y + config.cluster_padding;
                let between = if size.own_height > 0.0 { gap } else { 0.0 };
                let block_origin = (
                    cx - size.child_block.0 / 2.0 + config.depth_margin,
                    content_top + size.own_height + between + config.depth_margin,
                );
                levels.push((arena.children[idx].clone(), block_origin, size.child_cell, size.children));
            }
        }
    }

    let mut out_nodes = nodes.to_vec();
    let spacing = config.node_spacing();
    for (idx, members) in arena.members.iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        let size = sizes[idx];
        let rect = boxes[idx];
        let target = (rect.center().0, rect.y + config.cluster_padding + size.own_height / 2.0);
        // Members move with the cluster; their relative order seeds the packing.
        if let [single] = members.as_slice() {
            out_nodes[*single].x = target.0;
            out_nodes[*single].y = target.1;
        } else {
            let mut ordered = members.clone();
            ordered.sort_by(|&a, &b| {
                nodes[a]
                    .y
                    .total_cmp(&nodes[b].y)
                    .then(nodes[a].x.total_cmp(&nodes[b].x))
                    .then(a.cmp(&b))
            });
            let half_cols = (size.own_cols as f32 - 1.0) / 2.0;
            let half_rows = (size.own_rows as f32 - 1.0) / 2.0;
            for (slot, &n) in ordered.iter().enumerate() {
                let col = (slot % size.own_cols) as f32;
                let row = (slot / size.own_cols) as f32;
                out_nodes[n].x = target.0 + (col - half_cols) * spacing;
                out_nodes[n].y = target.1 + (row - half_rows) * spacing;
            }
        }
        trace!("packed {} members of {}", members.len(), clusters[idx].id);
    }

    relocate_floating(&arena, &boxes, &mut out_nodes, config);

    let out_clusters = clusters
        .iter()
        .zip(&boxes)
        .map(|(cluster, rect)| {
            let (cx, cy) = rect.center();
            Cluster {
                x: Some(cx),
                y: Some(cy),
                ..cluster.clone()
            }
        })
        .collect();
    (out_clusters, out_nodes)
}

fn relocate_floating(arena: &ClusterArena, boxes: &[Rect], nodes: &mut [Node], config: &LayoutConfig) {
    if arena.floating.is_empty() {
        return;
    }
    let icon = config.icon_size;
    let root_boxes: Vec<Rect> = arena.roots.iter().map(|&r| boxes[r]).collect();
    let grid_bottom = root_boxes.iter().map(Rect::bottom).fold(config.origin_y, f32::max);
    let spacing = config.node_spacing();
    let start = (config.origin_x + spacing / 2.0, grid_bottom + config.cluster_gap + spacing / 2.0);

    let mut occupied: Vec<(f32, f32)> = Vec::new();
    let mut displaced = Vec::new();
    for &n in &arena.floating {
        let rect = Rect::from_center(nodes[n].x, nodes[n].y, icon, icon);
        if root_boxes.iter().any(|b| b.intersects(&rect)) {
            displaced.push(n);
        } else {
            occupied.push((nodes[n].x, nodes[n].y));
        }
    }
    for n in displaced {
        let (x, y) = free_slot_from(start, &occupied, config);
        trace!("moving floating node {} out of the cluster grid", nodes[n].id);
        nodes[n].x = x;
        nodes[n].y = y;
        occupied.push((x, y));
    }
}

/// Runs [`layout_clusters`] over a whole graph; edges pass through unchanged.
pub fn compute_layout(graph: &Graph, fixed: Option<&FixedAnchor>, config: &LayoutConfig) -> Graph {
    let (clusters, nodes) = layout_clusters(&graph.clusters, &graph.nodes, fixed, config);
    Graph {
        clusters,
        nodes,
        edges: graph.edges.clone(),
    }
}

/// Outline rectangle per cluster: member icons plus padding, grown to enclose
/// each child outline with `depth_margin` clearance. Empty clusters get the
/// default size around their anchor, or around the cell their grid index
/// would occupy when they have never been laid out.
pub fn cluster_bounds(graph: &Graph, config: &LayoutConfig) -> Vec<ClusterBounds> {
    let arena = ClusterArena::build(&graph.clusters, &graph.nodes);
    let mut rects: Vec<Option<Rect>> = vec![None; graph.clusters.len()];
    for idx in arena.post_order() {
        let mut rect: Option<Rect> = None;
        for &n in &arena.members[idx] {
            let node = &graph.nodes[n];
            let icon = Rect::from_center(node.x, node.y, config.icon_size, config.icon_size)
                .expand(config.cluster_padding);
            rect = Some(rect.map_or(icon, |r| r.union(&icon)));
        }
        for &child in &arena.children[idx] {
            if let Some(child_rect) = rects[child] {
                let grown = child_rect.expand(config.depth_margin);
                rect = Some(rect.map_or(grown, |r| r.union(&grown)));
            }
        }
        let cluster = &graph.clusters[idx];
        let rect = rect.unwrap_or_else(|| {
            let (cx, cy) = match (cluster.x, cluster.y) {
                (Some(x), Some(y)) => (x, y),
                _ => cluster_cell_center(idx, graph.clusters.len(), config),
            };
            Rect::from_center(cx, cy, config.empty_cluster_width, config.empty_cluster_height)
        });
        rects[idx] = Some(rect);
    }
    graph
        .clusters
        .iter()
        .enumerate()
        .filter_map(|(idx, cluster)| {
            rects[idx].map(|rect| ClusterBounds {
                id: cluster.id.clone(),
                label: cluster.label.clone(),
                depth: arena.depth[idx],
                rect,
            })
        })
        .collect()
}
