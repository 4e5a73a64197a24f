use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Side length of a node's icon box.
    pub icon_size: f32,
    /// Gap between neighbouring icons when packing a cluster.
    pub node_margin: f32,
    /// Space between a cluster outline and its own contents.
    pub cluster_padding: f32,
    /// Extra clearance added per nesting level between a parent and child outline.
    pub depth_margin: f32,
    /// Gap between neighbouring grid cells.
    pub cluster_gap: f32,
    pub empty_cluster_width: f32,
    pub empty_cluster_height: f32,
    /// Width available to the cluster grid before columns are reduced.
    pub canvas_width: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

impl LayoutConfig {
    /// Centre-to-centre distance between packed icons.
    pub fn node_spacing(&self) -> f32 {
        self.icon_size + self.node_margin
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            icon_size: 64.0,
            node_margin: 40.0,
            cluster_padding: 24.0,
            depth_margin: 16.0,
            cluster_gap: 48.0,
            empty_cluster_width: 200.0,
            empty_cluster_height: 140.0,
            canvas_width: 1200.0,
            origin_x: 40.0,
            origin_y: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Distance from a node centre to where its edges start or end.
    pub edge_offset: f32,
    /// Additional pull-back on ends that carry an arrowhead.
    pub arrow_clearance: f32,
    /// Padding added around each obstacle icon box.
    pub obstacle_padding: f32,
    /// Perpendicular offset step for U/S/J detours.
    pub detour_step: f32,
    /// How many multiples of `detour_step` are tried.
    pub detour_steps: usize,
    pub curve_samples: usize,
    pub grid_cell: f32,
    pub grid_margin: f32,
    pub max_grid_cells: usize,
    /// Number of closest attachment pairs handed to the grid search.
    pub grid_pairs: usize,
    /// Perpendicular distance of an edge label from its line.
    pub label_offset: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            edge_offset: 36.0,
            arrow_clearance: 6.0,
            obstacle_padding: 8.0,
            detour_step: 40.0,
            detour_steps: 4,
            curve_samples: 16,
            grid_cell: 16.0,
            grid_margin: 120.0,
            max_grid_cells: 40_000,
            grid_pairs: 4,
            label_offset: 12.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    icon_size: Option<f32>,
    node_margin: Option<f32>,
    cluster_padding: Option<f32>,
    depth_margin: Option<f32>,
    cluster_gap: Option<f32>,
    empty_cluster_width: Option<f32>,
    empty_cluster_height: Option<f32>,
    canvas_width: Option<f32>,
    origin_x: Option<f32>,
    origin_y: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingConfigFile {
    edge_offset: Option<f32>,
    arrow_clearance: Option<f32>,
    obstacle_padding: Option<f32>,
    detour_step: Option<f32>,
    detour_steps: Option<usize>,
    curve_samples: Option<usize>,
    grid_cell: Option<f32>,
    grid_margin: Option<f32>,
    max_grid_cells: Option<usize>,
    grid_pairs: Option<usize>,
    label_offset: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    routing: Option<RoutingConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Applies the overrides in `contents` (JSON, or JSON5 as a fallback) on top
/// of the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| ConfigError::Invalid(json_err.to_string()))?,
    };
    let mut config = Config::default();

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.icon_size {
            target.icon_size = v;
        }
        if let Some(v) = layout.node_margin {
            target.node_margin = v;
        }
        if let Some(v) = layout.cluster_padding {
            target.cluster_padding = v;
        }
        if let Some(v) = layout.depth_margin {
            target.depth_margin = v;
        }
        if let Some(v) = layout.cluster_gap {
            target.cluster_gap = v;
        }
        if let Some(v) = layout.empty_cluster_width {
            target.empty_cluster_width = v;
        }
        if let Some(v) = layout.empty_cluster_height {
            target.empty_cluster_height = v;
        }
        if let Some(v) = layout.canvas_width {
            target.canvas_width = v;
        }
        if let Some(v) = layout.origin_x {
            target.origin_x = v;
        }
        if let Some(v) = layout.origin_y {
            target.origin_y = v;
        }
    }

    if let Some(routing) = parsed.routing {
        let target = &mut config.routing;
        if let Some(v) = routing.edge_offset {
            target.edge_offset = v;
        }
        if let Some(v) = routing.arrow_clearance {
            target.arrow_clearance = v;
        }
        if let Some(v) = routing.obstacle_padding {
            target.obstacle_padding = v;
        }
        if let Some(v) = routing.detour_step {
            target.detour_step = v;
        }
        if let Some(v) = routing.detour_steps {
            target.detour_steps = v;
        }
        if let Some(v) = routing.curve_samples {
            target.curve_samples = v.max(2);
        }
        if let Some(v) = routing.grid_cell {
            target.grid_cell = v;
        }
        if let Some(v) = routing.grid_margin {
            target.grid_margin = v;
        }
        if let Some(v) = routing.max_grid_cells {
            target.max_grid_cells = v;
        }
        if let Some(v) = routing.grid_pairs {
            target.grid_pairs = v.max(1);
        }
        if let Some(v) = routing.label_offset {
            target.label_offset = v;
        }
    }

    Ok(config)
}
