//! Obstacle-avoiding edge routing.
//!
//! Every edge is tried between eight attachment points on each end. The
//! strategies run cheapest first and the first strategy that yields any clear
//! polyline wins, keeping its shortest candidate. Straight segments and
//! single-bend elbows share the first strategy, so a short elbow beats a long
//! straight line. Only when all of them fail is the direct segment returned
//! and flagged as blocked.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f32::consts::FRAC_1_SQRT_2;

use log::{debug, trace, warn};

use super::types::{EdgeRoute, Rect, RoutedEdge};
use crate::config::{Config, RoutingConfig};
use crate::ir::{EdgeType, Graph, Node};

const EPS: f32 = 1e-4;
/// Extra clearance when marking grid cells as blocked.
const GRID_BLOCK_PAD: f32 = 0.5;
const MIN_GRID_CELL: f32 = 4.0;

/// East, then clockwise in screen coordinates.
const COMPASS: [(f32, f32); 8] = [
    (1.0, 0.0),
    (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (0.0, 1.0),
    (-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (-1.0, 0.0),
    (-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
    (0.0, -1.0),
    (FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
];

type Point = (f32, f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    /// Straight segments and single-bend elbows, compared by length.
    Direct,
    Detour,
    Curve,
    Grid,
}

impl Tier {
    const ALL: [Tier; 4] = [Tier::Direct, Tier::Detour, Tier::Curve, Tier::Grid];

    fn as_str(self) -> &'static str {
        match self {
            Tier::Direct => "direct",
            Tier::Detour => "detour",
            Tier::Curve => "curve",
            Tier::Grid => "grid",
        }
    }
}

fn icon_rect(node: &Node, config: &Config) -> Rect {
    let size = config.layout.icon_size;
    Rect::from_center(node.x, node.y, size, size)
}

/// Padded icon boxes of every node other than the two endpoints.
fn obstacles_for(from: &Node, to: &Node, nodes: &[Node], config: &Config) -> Vec<Rect> {
    nodes
        .iter()
        .filter(|node| node.id != from.id && node.id != to.id)
        .map(|node| icon_rect(node, config).expand(config.routing.obstacle_padding))
        .collect()
}

fn attachment_points(node: &Node, radius: f32) -> Vec<Point> {
    COMPASS
        .iter()
        .map(|(dx, dy)| (node.x + dx * radius, node.y + dy * radius))
        .collect()
}

fn endpoint_radius(config: &RoutingConfig, arrow: bool) -> f32 {
    if arrow {
        config.edge_offset + config.arrow_clearance
    } else {
        config.edge_offset
    }
}

fn same_point(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() <= EPS && (a.1 - b.1).abs() <= EPS
}

/// Routes one edge between two laid-out nodes, avoiding every other node in
/// `nodes`. Always returns a polyline of at least two points.
///
/// Strategies are tried in order: direct (straight or one bend), detour,
/// curve, grid. Within the first strategy that finds a clear polyline the
/// shortest candidate over all attachment pairs wins and later strategies are
/// not tried, so a clear detour is never traded for a shorter curve. `routed`
/// is set whenever the winner has a bend.
pub fn route_edge(from: &Node, to: &Node, edge_type: EdgeType, nodes: &[Node], config: &Config) -> EdgeRoute {
    let obstacles = obstacles_for(from, to, nodes, config);
    if from.id == to.id {
        let points = self_loop(from, config);
        let blocked = !path_is_clear(&points, &obstacles);
        let label_anchor = label_anchor(&points, config.routing.label_offset);
        return EdgeRoute {
            points,
            routed: false,
            blocked,
            label_anchor,
        };
    }

    let starts = attachment_points(from, endpoint_radius(&config.routing, edge_type.arrow_start()));
    let ends = attachment_points(to, endpoint_radius(&config.routing, edge_type.arrow_end()));
    let mut pairs: Vec<(Point, Point)> = Vec::with_capacity(starts.len() * ends.len());
    for &a in &starts {
        for &b in &ends {
            if !same_point(a, b) {
                pairs.push((a, b));
            }
        }
    }

    for tier in Tier::ALL {
        if let Some(points) = best_in_tier(tier, &pairs, &obstacles, &config.routing) {
            trace!("edge {} -> {} routed by {} tier", from.id, to.id, tier.as_str());
            let label_anchor = label_anchor(&points, config.routing.label_offset);
            let routed = points.len() > 2;
            return EdgeRoute {
                points,
                routed,
                blocked: false,
                label_anchor,
            };
        }
    }

    let (a, b) = pairs
        .iter()
        .copied()
        .min_by(|x, y| distance(x.0, x.1).total_cmp(&distance(y.0, y.1)))
        .unwrap_or(((from.x, from.y), (to.x, to.y)));
    let points = vec![a, b];
    let blocked = !path_is_clear(&points, &obstacles);
    if blocked {
        debug!("no clear route for {} -> {}, drawing through obstacles", from.id, to.id);
    }
    let label_anchor = label_anchor(&points, config.routing.label_offset);
    EdgeRoute {
        points,
        routed: false,
        blocked,
        label_anchor,
    }
}

/// Routes every edge of a laid-out graph. Edges whose endpoints are missing
/// are skipped; label anchors are kept only for labelled edges.
pub fn route_all(graph: &Graph, config: &Config) -> Vec<RoutedEdge> {
    let mut routed = Vec::with_capacity(graph.edges.len());
    for edge in &graph.edges {
        let (Some(from), Some(to)) = (graph.node(&edge.from), graph.node(&edge.to)) else {
            warn!("skipping edge {} with a missing endpoint", edge.id);
            continue;
        };
        let mut route = route_edge(from, to, edge.edge_type, &graph.nodes, config);
        let has_label = edge.label.as_deref().is_some_and(|label| !label.is_empty());
        if !has_label {
            route.label_anchor = None;
        }
        routed.push(RoutedEdge {
            id: edge.id.clone(),
            from: edge.from.clone(),
            to: edge.to.clone(),
            label: edge.label.clone(),
            edge_type: edge.edge_type,
            route,
        });
    }
    debug!(
        "routed {} edges, {} with detours, {} blocked",
        routed.len(),
        routed.iter().filter(|e| e.route.routed).count(),
        routed.iter().filter(|e| e.route.blocked).count()
    );
    routed
}

/// True when some segment of `points` touches the padded icon box of a node
/// other than `from` and `to`.
pub fn path_crosses_nodes(points: &[Point], from: &Node, to: &Node, nodes: &[Node], config: &Config) -> bool {
    !path_is_clear(points, &obstacles_for(from, to, nodes, config))
}

fn best_in_tier(tier: Tier, pairs: &[(Point, Point)], obstacles: &[Rect], config: &RoutingConfig) -> Option<Vec<Point>> {
    let mut best: Option<(f32, Vec<Point>)> = None;
    let mut consider = |points: Vec<Point>| {
        let points = compress_path(&points);
        if points.len() < 2 || !path_is_clear(&points, obstacles) {
            return;
        }
        let length = path_length(&points);
        if best.as_ref().is_none_or(|(best_len, _)| length < *best_len) {
            best = Some((length, points));
        }
    };

    match tier {
        Tier::Direct => {
            for &(a, b) in pairs {
                consider(vec![a, b]);
                consider(vec![a, (b.0, a.1), b]);
                consider(vec![a, (a.0, b.1), b]);
            }
        }
        Tier::Detour => {
            for step in 1..=config.detour_steps {
                let offset = config.detour_step * step as f32;
                for &(a, b) in pairs {
                    for path in detours(a, b, offset) {
                        consider(path);
                    }
                }
            }
        }
        Tier::Curve => {
            for step in 1..=config.detour_steps {
                let offset = config.detour_step * step as f32;
                for &(a, b) in pairs {
                    consider(quadratic_curve(a, b, offset, config.curve_samples));
                    consider(quadratic_curve(a, b, -offset, config.curve_samples));
                }
            }
        }
        Tier::Grid => {
            let mut nearest: Vec<(Point, Point)> = pairs.to_vec();
            nearest.sort_by(|x, y| distance(x.0, x.1).total_cmp(&distance(y.0, y.1)));
            for &(a, b) in nearest.iter().take(config.grid_pairs.max(1)) {
                if let Some(path) = grid_route(a, b, obstacles, config) {
                    consider(path);
                }
            }
        }
    }
    best.map(|(_, points)| points)
}

/// U, S and J shaped detours at one perpendicular offset, in all four
/// principal directions.
fn detours(a: Point, b: Point, offset: f32) -> Vec<Vec<Point>> {
    let top = a.1.min(b.1) - offset;
    let bottom = a.1.max(b.1) + offset;
    let left = a.0.min(b.0) - offset;
    let right = a.0.max(b.0) + offset;
    let mid_x = (a.0 + b.0) / 2.0;
    let mid_y = (a.1 + b.1) / 2.0;
    let toward_x = if b.0 >= a.0 { 1.0 } else { -1.0 };
    let toward_y = if b.1 >= a.1 { 1.0 } else { -1.0 };

    let mut paths = Vec::with_capacity(12);
    // U: out to a channel beyond both points and back.
    for y in [top, bottom] {
        paths.push(vec![a, (a.0, y), (b.0, y), b]);
    }
    for x in [left, right] {
        paths.push(vec![a, (x, a.1), (x, b.1), b]);
    }
    // S: a channel between the points, shifted off the midline.
    for sign in [-1.0, 1.0] {
        let y = mid_y + sign * offset;
        paths.push(vec![a, (a.0, y), (b.0, y), b]);
        let x = mid_x + sign * offset;
        paths.push(vec![a, (x, a.1), (x, b.1), b]);
    }
    // J: step aside, pass the target, come back in.
    for sign in [-1.0, 1.0] {
        let y = a.1 + sign * offset;
        let x = b.0 + toward_x * offset;
        paths.push(vec![a, (a.0, y), (x, y), (x, b.1), b]);
        let x = a.0 + sign * offset;
        let y = b.1 + toward_y * offset;
        paths.push(vec![a, (x, a.1), (x, y), (b.0, y), b]);
    }
    paths
}

fn quadratic_curve(a: Point, b: Point, bend: f32, samples: usize) -> Vec<Point> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len <= EPS {
        return vec![a, b];
    }
    let normal = (-dy / len, dx / len);
    let control = ((a.0 + b.0) / 2.0 + normal.0 * bend, (a.1 + b.1) / 2.0 + normal.1 * bend);
    let samples = samples.max(2);
    (0..=samples)
        .map(|i| {
            let t = i as f32 / samples as f32;
            let u = 1.0 - t;
            (
                u * u * a.0 + 2.0 * u * t * control.0 + t * t * b.0,
                u * u * a.1 + 2.0 * u * t * control.1 + t * t * b.1,
            )
        })
        .collect()
}

fn self_loop(node: &Node, config: &Config) -> Vec<Point> {
    let half = config.layout.icon_size / 2.0;
    let pad = config.routing.edge_offset / 2.0;
    let (cx, cy) = (node.x, node.y);
    vec![
        (cx + half, cy - half / 2.0),
        (cx + half + pad, cy - half / 2.0),
        (cx + half + pad, cy - half - pad),
        (cx + half / 2.0, cy - half - pad),
        (cx + half / 2.0, cy - half),
    ]
}

struct RoutingGrid {
    cell: f32,
    min_x: f32,
    min_y: f32,
    cols: i32,
    rows: i32,
    blocked: Vec<bool>,
}

impl RoutingGrid {
    /// Rasterizes the box around `a` and `b` grown by `grid_margin`. The cell
    /// grows when the region would exceed `max_grid_cells`.
    fn new(a: Point, b: Point, obstacles: &[Rect], config: &RoutingConfig) -> Option<Self> {
        if config.max_grid_cells == 0 {
            return None;
        }
        let margin = config.grid_margin;
        let min_x = a.0.min(b.0) - margin;
        let min_y = a.1.min(b.1) - margin;
        let width = (a.0.max(b.0) + margin) - min_x;
        let height = (a.1.max(b.1) + margin) - min_y;

        let mut cell = config.grid_cell.max(MIN_GRID_CELL);
        let dims = |cell: f32| ((width / cell).ceil() as i32 + 1, (height / cell).ceil() as i32 + 1);
        let (mut cols, mut rows) = dims(cell);
        while (cols as usize).saturating_mul(rows as usize) > config.max_grid_cells {
            cell *= 1.25;
            (cols, rows) = dims(cell);
        }
        if cols <= 1 || rows <= 1 {
            return None;
        }

        let mut blocked = vec![false; (cols * rows) as usize];
        for obstacle in obstacles {
            let rect = obstacle.expand(GRID_BLOCK_PAD);
            let start_x = ((rect.x - min_x) / cell).floor().max(0.0) as i32;
            let end_x = ((rect.right() - min_x) / cell).floor().min((cols - 1) as f32) as i32;
            let start_y = ((rect.y - min_y) / cell).floor().max(0.0) as i32;
            let end_y = ((rect.bottom() - min_y) / cell).floor().min((rows - 1) as f32) as i32;
            for iy in start_y..=end_y {
                for ix in start_x..=end_x {
                    blocked[(iy * cols + ix) as usize] = true;
                }
            }
        }
        Some(Self {
            cell,
            min_x,
            min_y,
            cols,
            rows,
            blocked,
        })
    }

    fn index(&self, ix: i32, iy: i32) -> usize {
        (iy * self.cols + ix) as usize
    }

    fn cell_for_point(&self, x: f32, y: f32) -> Option<(i32, i32)> {
        let ix = ((x - self.min_x) / self.cell).floor() as i32;
        let iy = ((y - self.min_y) / self.cell).floor() as i32;
        if ix < 0 || iy < 0 || ix >= self.cols || iy >= self.rows {
            return None;
        }
        Some((ix, iy))
    }

    fn cell_center(&self, ix: i32, iy: i32) -> Point {
        (
            self.min_x + (ix as f32 + 0.5) * self.cell,
            self.min_y + (iy as f32 + 0.5) * self.cell,
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    cost: u32,
    x: i32,
    y: i32,
}

impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| self.y.cmp(&other.y))
            .then_with(|| self.x.cmp(&other.x))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over four-way grid moves, one unit per hop with a Manhattan heuristic.
/// The start and goal cells are never treated as blocked.
fn grid_search(grid: &RoutingGrid, start: (i32, i32), goal: (i32, i32)) -> Option<Vec<(i32, i32)>> {
    const DIRS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
    let total = (grid.cols * grid.rows) as usize;
    let mut best_cost = vec![u32::MAX; total];
    let mut prev: Vec<Option<(i32, i32)>> = vec![None; total];
    let mut heap = BinaryHeap::new();
    best_cost[grid.index(start.0, start.1)] = 0;
    heap.push(GridEntry {
        est: 0,
        cost: 0,
        x: start.0,
        y: start.1,
    });

    let mut found = false;
    while let Some(GridEntry { cost, x, y, .. }) = heap.pop() {
        if cost != best_cost[grid.index(x, y)] {
            continue;
        }
        if (x, y) == goal {
            found = true;
            break;
        }
        for (dx, dy) in DIRS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= grid.cols || ny >= grid.rows {
                continue;
            }
            let idx = grid.index(nx, ny);
            if grid.blocked[idx] && (nx, ny) != goal && (nx, ny) != start {
                continue;
            }
            let next_cost = cost + 1;
            if next_cost >= best_cost[idx] {
                continue;
            }
            best_cost[idx] = next_cost;
            prev[idx] = Some((x, y));
            let manhattan = (nx - goal.0).unsigned_abs() + (ny - goal.1).unsigned_abs();
            heap.push(GridEntry {
                est: next_cost + manhattan,
                cost: next_cost,
                x: nx,
                y: ny,
            });
        }
    }
    if !found {
        return None;
    }

    let mut cells = vec![goal];
    let mut cur = goal;
    while let Some(step) = prev[grid.index(cur.0, cur.1)] {
        cells.push(step);
        cur = step;
    }
    cells.reverse();
    Some(cells)
}

fn grid_route(a: Point, b: Point, obstacles: &[Rect], config: &RoutingConfig) -> Option<Vec<Point>> {
    let grid = RoutingGrid::new(a, b, obstacles, config)?;
    let start = grid.cell_for_point(a.0, a.1)?;
    let goal = grid.cell_for_point(b.0, b.1)?;
    if start == goal {
        return Some(vec![a, b]);
    }
    let cells = grid_search(&grid, start, goal)?;

    let mut points: Vec<Point> = Vec::with_capacity(cells.len() + 4);
    points.push(a);
    let first = grid.cell_center(start.0, start.1);
    points.push((first.0, a.1));
    for &(ix, iy) in &cells {
        points.push(grid.cell_center(ix, iy));
    }
    let last = grid.cell_center(goal.0, goal.1);
    points.push((last.0, b.1));
    points.push(b);
    Some(points)
}

/// Drops repeated points and interior points on a straight horizontal or
/// vertical run. The first and last points are kept exactly.
fn compress_path(points: &[Point]) -> Vec<Point> {
    let mut deduped: Vec<Point> = Vec::with_capacity(points.len());
    for &point in points {
        if deduped.last().is_none_or(|&last| !same_point(last, point)) {
            deduped.push(point);
        }
    }
    if deduped.len() <= 2 {
        return deduped;
    }
    let mut out: Vec<Point> = Vec::with_capacity(deduped.len());
    out.push(deduped[0]);
    for idx in 1..deduped.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = deduped[idx];
        let next = deduped[idx + 1];
        let dx1 = curr.0 - prev.0;
        let dy1 = curr.1 - prev.1;
        let dx2 = next.0 - curr.0;
        let dy2 = next.1 - curr.1;
        if (dx1.abs() <= EPS && dx2.abs() <= EPS) || (dy1.abs() <= EPS && dy2.abs() <= EPS) {
            continue;
        }
        out.push(curr);
    }
    out.push(deduped[deduped.len() - 1]);
    out
}

fn path_is_clear(points: &[Point], obstacles: &[Rect]) -> bool {
    if points.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
        return false;
    }
    points
        .windows(2)
        .all(|segment| obstacles.iter().all(|rect| !segment_intersects_rect(segment[0], segment[1], rect)))
}

fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let (x1, y1) = a;
    let (x2, y2) = b;
    if x1.max(x2) < rect.x || x1.min(x2) > rect.right() || y1.max(y2) < rect.y || y1.min(y2) > rect.bottom() {
        return false;
    }
    if rect.contains_point(a) || rect.contains_point(b) {
        return true;
    }
    let corners = [
        (rect.x, rect.y),
        (rect.right(), rect.y),
        (rect.right(), rect.bottom()),
        (rect.x, rect.bottom()),
    ];
    (0..4).any(|i| segments_intersect(a, b, corners[i], corners[(i + 1) % 4]))
}

fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    }
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        c.0 >= a.0.min(b.0) - 1e-6
            && c.0 <= a.0.max(b.0) + 1e-6
            && c.1 >= a.1.min(b.1) - 1e-6
            && c.1 <= a.1.max(b.1) + 1e-6
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0) && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0) {
        return true;
    }
    (o1.abs() <= 1e-6 && on_segment(a, b, c))
        || (o2.abs() <= 1e-6 && on_segment(a, b, d))
        || (o3.abs() <= 1e-6 && on_segment(c, d, a))
        || (o4.abs() <= 1e-6 && on_segment(c, d, b))
}

fn distance(a: Point, b: Point) -> f32 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

fn path_length(points: &[Point]) -> f32 {
    points.windows(2).map(|segment| distance(segment[0], segment[1])).sum()
}

/// Point halfway along the polyline, pushed `offset` off the line toward the
/// top of the canvas (toward the left on vertical runs).
pub fn label_anchor(points: &[Point], offset: f32) -> Option<Point> {
    if points.len() < 2 {
        return None;
    }
    let total = path_length(points);
    if total <= EPS {
        let p = points[0];
        return Some((p.0, p.1 - offset));
    }
    let mut remaining = total / 2.0;
    for segment in points.windows(2) {
        let (p1, p2) = (segment[0], segment[1]);
        let len = distance(p1, p2);
        if len <= EPS {
            continue;
        }
        if remaining <= len {
            let t = remaining / len;
            let mid = (p1.0 + (p2.0 - p1.0) * t, p1.1 + (p2.1 - p1.1) * t);
            let tangent = ((p2.0 - p1.0) / len, (p2.1 - p1.1) / len);
            let mut normal = (tangent.1, -tangent.0);
            if normal.1 > EPS || (normal.1.abs() <= EPS && normal.0 > 0.0) {
                normal = (-normal.0, -normal.1);
            }
            return Some((mid.0 + normal.0 * offset, mid.1 + normal.1 * offset));
        }
        remaining -= len;
    }
    points.last().map(|&(x, y)| (x, y - offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f32, y: f32) -> Node {
        Node {
            id: id.to_string(),
            label: id.to_string(),
            name: None,
            x,
            y,
            cluster_id: None,
        }
    }

    fn route(nodes: &[Node]) -> EdgeRoute {
        route_edge(&nodes[0], &nodes[1], EdgeType::Solid, nodes, &Config::default())
    }

    #[test]
    fn clear_line_stays_straight() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 400.0, 0.0), node("c", 200.0, 300.0)];
        let route = route(&nodes);
        assert!(!route.routed);
        assert!(!route.blocked);
        assert_eq!(route.points.len(), 2);
        // Facing attachment points: east of a, west of b.
        assert_eq!(route.points[0], (36.0, 0.0));
        assert_eq!(route.points[1], (400.0 - 42.0, 0.0));
    }

    #[test]
    fn node_on_the_line_forces_a_detour() {
        let config = Config::default();
        let nodes = vec![node("a", 0.0, 0.0), node("b", 400.0, 0.0), node("c", 200.0, 0.0)];
        let route = route(&nodes);
        assert!(route.routed);
        assert!(!route.blocked);
        assert!(route.points.len() > 2);
        assert!(!path_crosses_nodes(&route.points, &nodes[0], &nodes[1], &nodes, &config));
        let obstacle = icon_rect(&nodes[2], &config).expand(config.routing.obstacle_padding);
        assert!(segment_intersects_rect(route.points[0], *route.points.last().unwrap(), &obstacle));
    }

    #[test]
    fn short_elbow_beats_long_straight() {
        let config = RoutingConfig::default();
        let pebble = Rect::from_center(50.0, 50.0, 10.0, 10.0);
        // The first pair's diagonal is blocked but its elbow is clear; the
        // second pair has a clear straight line that is longer than that elbow.
        let pairs = [((0.0, 0.0), (100.0, 100.0)), ((0.0, -80.0), (250.0, 100.0))];
        let points = best_in_tier(Tier::Direct, &pairs, &[pebble], &config).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], (0.0, 0.0));
        assert_eq!(points[2], (100.0, 100.0));
        assert!((path_length(&points) - 200.0).abs() < 1e-3);
        assert!(path_is_clear(&points, &[pebble]));
    }

    #[test]
    fn exhausted_router_returns_the_direct_segment() {
        let config = Config::default();
        // c sits on top of a, so every attachment point of a is inside an obstacle.
        let nodes = vec![node("a", 0.0, 0.0), node("b", 400.0, 0.0), node("c", 0.0, 0.0)];
        let route = route(&nodes);
        assert!(!route.routed);
        assert!(route.blocked);
        assert_eq!(route.points.len(), 2);
        assert!(path_crosses_nodes(&route.points, &nodes[0], &nodes[1], &nodes, &config));
    }

    #[test]
    fn wall_with_one_open_side_is_passed_below() {
        let config = Config::default();
        let mut nodes = vec![node("a", 0.0, 0.0), node("b", 600.0, 0.0)];
        // A wall between the nodes reaching far above the line but only briefly below it.
        for (i, y) in [-240.0f32, -160.0, -80.0, 0.0, 80.0].iter().enumerate() {
            nodes.push(node(&format!("w{i}"), 300.0, *y));
        }
        let route = route(&nodes);
        assert!(route.routed);
        assert_eq!(route.blocked, path_crosses_nodes(&route.points, &nodes[0], &nodes[1], &nodes, &config));
        assert!(!route.blocked);
        let lowest = route.points.iter().map(|p| p.1).fold(f32::MIN, f32::max);
        assert!(lowest > 120.0);
    }

    #[test]
    fn double_arrows_pull_back_both_ends() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 400.0, 0.0)];
        let route = route_edge(&nodes[0], &nodes[1], EdgeType::Double, &nodes, &Config::default());
        assert_eq!(route.points[0], (42.0, 0.0));
    }

    #[test]
    fn self_loop_sits_top_right() {
        let nodes = vec![node("a", 100.0, 100.0)];
        let route = route_edge(&nodes[0], &nodes[0], EdgeType::Solid, &nodes, &Config::default());
        assert_eq!(route.points.len(), 5);
        assert!(route.points.iter().all(|p| p.0 > 100.0 && p.1 < 100.0));
        assert!(!route.routed);
        assert!(!route.blocked);
    }

    #[test]
    fn label_sits_above_horizontal_and_left_of_vertical() {
        assert_eq!(label_anchor(&[(0.0, 0.0), (100.0, 0.0)], 12.0), Some((50.0, -12.0)));
        assert_eq!(label_anchor(&[(100.0, 0.0), (0.0, 0.0)], 12.0), Some((50.0, -12.0)));
        assert_eq!(label_anchor(&[(0.0, 0.0), (0.0, 100.0)], 12.0), Some((-12.0, 50.0)));
        // Halfway along an L: the 50% point lies on the first leg.
        assert_eq!(
            label_anchor(&[(0.0, 0.0), (100.0, 0.0), (100.0, 40.0)], 10.0),
            Some((70.0, -10.0))
        );
        assert_eq!(label_anchor(&[(1.0, 1.0)], 10.0), None);
    }

    #[test]
    fn compress_drops_collinear_points() {
        let path = compress_path(&[(0.0, 0.0), (10.0, 0.0), (10.0, 0.0), (20.0, 0.0), (20.0, 30.0)]);
        assert_eq!(path, vec![(0.0, 0.0), (20.0, 0.0), (20.0, 30.0)]);
    }

    #[test]
    fn grid_search_goes_around_a_wall() {
        let config = RoutingConfig::default();
        let wall = Rect::from_center(100.0, 0.0, 20.0, 200.0);
        let path = grid_route((0.0, 0.0), (200.0, 0.0), &[wall], &config).unwrap();
        assert_eq!(path[0], (0.0, 0.0));
        assert_eq!(*path.last().unwrap(), (200.0, 0.0));
        assert!(path_is_clear(&path, &[wall]));
    }

    #[test]
    fn route_all_skips_dangling_and_unlabelled_anchors() {
        let mut graph = crate::parser::parse("A -> B [label='go']\nB -> A");
        graph.nodes[0].x = 0.0;
        graph.nodes[1].x = 400.0;
        graph.nodes[0].y = 0.0;
        graph.nodes[1].y = 0.0;
        graph.edges.push(crate::ir::Edge {
            id: "edge-x".into(),
            from: "missing".into(),
            to: graph.nodes[0].id.clone(),
            label: None,
            edge_type: EdgeType::Solid,
        });
        let routes = route_all(&graph, &Config::default());
        assert_eq!(routes.len(), 2);
        assert!(routes[0].route.label_anchor.is_some());
        assert!(routes[1].route.label_anchor.is_none());
    }
}
