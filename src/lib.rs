#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod parser;
pub mod reconcile;
pub mod regenerate;
pub mod remote;
pub mod session;
pub mod tabular;

#[cfg(feature = "cli")]
pub use cli::{Args, run};
pub use config::{Config, LayoutConfig, RoutingConfig, load_config};
pub use ir::{Cluster, Edge, EdgeType, Graph, Node};
pub use layout::{
    ClusterBounds, EdgeRoute, FixedAnchor, RoutedEdge, cluster_bounds, compute_layout, layout_clusters, route_all,
    route_edge,
};
pub use parser::{parse, parse_with_known};
pub use reconcile::merge;
pub use regenerate::regenerate_prompt;
pub use remote::{RemoteError, RemoteParser, decode_remote_response};
pub use session::{RemoteStatus, Session, Ticket};
pub use tabular::{EdgeRow, NodeRow, Tables, tables_to_dsl};
