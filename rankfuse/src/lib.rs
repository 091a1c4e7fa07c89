//! Rank aggregation via fusion graphs.
//!
//! rankfuse turns per-descriptor nearest-neighbor rankings into a single
//! consensus ranking and scores it against ground truth:
//!
//! 1. [`generator`] / [`matrix`] build bounded ranks from a pairwise
//!    similarity function or a precomputed distance matrix, one file per
//!    query id.
//! 2. [`loader`] reads per-descriptor rank directories back, optionally
//!    applying mutual-neighbor reranking.
//! 3. [`aggregation`] fuses each query's ranks into a weighted consensus
//!    graph, ranks the graphs against each other with a
//!    maximum-common-subgraph similarity, and evaluates the result with
//!    standard IR metrics.
//!
//! The underlying pieces live in `rankfuse-core` (ranked lists, stores,
//! errors), `rankfuse-graph` (graphs, graph I/O, similarity), and
//! `rankfuse-eval` (quality measurement); this crate re-exports the common
//! entry points.

pub mod aggregation;
pub mod generator;
pub mod loader;
pub mod matrix;

pub use aggregation::{
    aggregate_ranks, evaluate_rank_dir, generate_fusion_graphs, load_graph_records,
    rank_from_fused_graphs, AggregationConfig,
};
pub use generator::{generate_cross_set, generate_rank, generate_self_pairwise};
pub use loader::{load_rank_dir, load_ranks_file, load_ranks_for_aggregation, write_ranks_file, RerankMode};
pub use matrix::{for_each_entry, generate_from_matrix, MatrixRankConfig};

pub use rankfuse_core::{
    FlatStore, FuseError, FuseResult, ItemId, RankEntry, RankedList, RankedListBuilder,
    SampleStore,
};
pub use rankfuse_eval::{LabelIndex, QualityMeasurer, QualityQueries};
pub use rankfuse_graph::{FusionGraph, GraphRecord, GraphSimilarity};
