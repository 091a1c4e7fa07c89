//! Fusion graphs for rank aggregation.
//!
//! This crate holds the weighted labeled digraph ([`FusionGraph`]), its
//! line-based persistence ([`GraphRecord`]), the per-query consensus-graph
//! construction ([`build_fusion_graph`]), and the maximum-common-subgraph
//! similarity measures ([`GraphSimilarity`]) used to compare those graphs in
//! the final ranking stage.

pub mod fusion;
pub mod graph;
pub mod io;
pub mod similarity;

pub use fusion::build_fusion_graph;
pub use graph::{Edge, FusionGraph};
pub use io::{graph_file, id_from_path, GraphRecord, GRAPH_EXT};
pub use similarity::{common_overlap, minimum_common_supergraph, GraphSimilarity};
