//! Placement heuristics for nodes that appear without a position.
//!
//! Positions live on a lattice spaced by the icon-plus-margin distance so that
//! a freshly placed node never sits on top of an existing one and the next
//! full layout pass has little to move.

use crate::config::LayoutConfig;

/// Rings scanned around a target before giving up and stacking on it.
const MAX_RINGS: i32 = 64;
/// Fraction of the lattice spacing two icons must be apart on some axis.
const CLEARANCE_RATIO: f32 = 0.9;

fn is_free(candidate: (f32, f32), occupied: &[(f32, f32)], config: &LayoutConfig) -> bool {
    let min_gap = config.node_spacing() * CLEARANCE_RATIO;
    occupied.iter().all(|&(x, y)| {
        (candidate.0 - x).abs() >= min_gap || (candidate.1 - y).abs() >= min_gap
    })
}

/// Grid cell centre a cluster at `index` (of `count`) would get from a layout
/// pass over empty clusters.
pub fn cluster_cell_center(index: usize, count: usize, config: &LayoutConfig) -> (f32, f32) {
    let cols = ((count.max(1) as f32).sqrt().round() as usize).max(1);
    let cell_w = config.empty_cluster_width + config.cluster_gap;
    let cell_h = config.empty_cluster_height + config.cluster_gap;
    let col = index % cols;
    let row = index / cols;
    (
        config.origin_x + (col as f32 + 0.5) * cell_w,
        config.origin_y + (row as f32 + 0.5) * cell_h,
    )
}

/// Position for a node produced by the parser, before any prior state or
/// layout pass is known. Clustered nodes fan out from their cluster's
/// estimated cell; floating nodes line up below the cluster grid.
pub fn provisional_position(
    cluster_index: Option<usize>,
    cluster_count: usize,
    member_index: usize,
    config: &LayoutConfig,
) -> (f32, f32) {
    let spacing = config.node_spacing();
    match cluster_index {
        Some(index) => {
            let (cx, cy) = cluster_cell_center(index, cluster_count, config);
            let per_row = 2usize;
            let col = member_index % per_row;
            let row = member_index / per_row;
            (
                cx + (col as f32 - 0.5) * spacing,
                cy + row as f32 * spacing,
            )
        }
        None => {
            let cols = ((cluster_count.max(1) as f32).sqrt().round() as usize).max(1);
            let rows = cluster_count.div_ceil(cols);
            let grid_bottom =
                config.origin_y + rows as f32 * (config.empty_cluster_height + config.cluster_gap);
            (
                config.origin_x + spacing / 2.0 + member_index as f32 * spacing,
                grid_bottom + spacing / 2.0,
            )
        }
    }
}

/// Nearest free lattice slot around `target`, scanning square rings outward.
pub fn place_near(target: (f32, f32), occupied: &[(f32, f32)], config: &LayoutConfig) -> (f32, f32) {
    let spacing = config.node_spacing();
    if is_free(target, occupied, config) {
        return target;
    }
    for ring in 1..=MAX_RINGS {
        for dy in -ring..=ring {
            for dx in -ring..=ring {
                if dx.abs() != ring && dy.abs() != ring {
                    continue;
                }
                let candidate = (target.0 + dx as f32 * spacing, target.1 + dy as f32 * spacing);
                if is_free(candidate, occupied, config) {
                    return candidate;
                }
            }
        }
    }
    target
}

/// First free slot in row-major order across the canvas.
pub fn free_slot(occupied: &[(f32, f32)], config: &LayoutConfig) -> (f32, f32) {
    let spacing = config.node_spacing();
    let start = (config.origin_x + spacing / 2.0, config.origin_y + spacing / 2.0);
    free_slot_from(start, occupied, config)
}

/// Like [`free_slot`], scanning rows of canvas width that start at `start`.
pub fn free_slot_from(start: (f32, f32), occupied: &[(f32, f32)], config: &LayoutConfig) -> (f32, f32) {
    let spacing = config.node_spacing();
    let cols = ((config.canvas_width / spacing).floor() as usize).max(1);
    for slot in 0..cols * MAX_RINGS as usize {
        let candidate = (
            start.0 + (slot % cols) as f32 * spacing,
            start.1 + (slot / cols) as f32 * spacing,
        );
        if is_free(candidate, occupied, config) {
            return candidate;
        }
    }
    place_near(start, occupied, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_near_returns_target_when_free() {
        let config = LayoutConfig::default();
        assert_eq!(place_near((10.0, 20.0), &[], &config), (10.0, 20.0));
    }

    #[test]
    fn place_near_steps_off_occupied_target() {
        let config = LayoutConfig::default();
        let occupied = [(100.0, 100.0)];
        let placed = place_near((100.0, 100.0), &occupied, &config);
        assert_ne!(placed, (100.0, 100.0));
        let gap = config.node_spacing();
        assert!((placed.0 - 100.0).abs() <= gap + 0.1 && (placed.1 - 100.0).abs() <= gap + 0.1);
    }

    #[test]
    fn free_slot_skips_taken_positions() {
        let config = LayoutConfig::default();
        let first = free_slot(&[], &config);
        let second = free_slot(&[first], &config);
        assert_ne!(first, second);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn provisional_positions_differ_per_member() {
        let config = LayoutConfig::default();
        let a = provisional_position(Some(0), 2, 0, &config);
        let b = provisional_position(Some(0), 2, 1, &config);
        let c = provisional_position(Some(1), 2, 0, &config);
        assert_ne!(a, b);
        assert_ne!(a, c);
        let floating = provisional_position(None, 2, 0, &config);
        assert!(floating.1 > a.1);
    }
}
