//! Maximum-common-subgraph similarity between fusion graphs.
//!
//! The "maximum common subgraph" here is the identity-matched overlap of two
//! graphs, not general subgraph isomorphism: a vertex is common when the same
//! item id appears in both graphs, and an edge is common when both graphs
//! hold an edge with the same `(source, target, label)` triple. Overlap
//! weights take the minimum of the two sides.
//!
//! The measures are granularity-agnostic: they compare whole per-query
//! fusion graphs in the final ranking stage and single-vertex neighborhood
//! graphs alike.

use serde::{Deserialize, Serialize};

use rankfuse_core::{FuseError, FuseResult};

use crate::graph::FusionGraph;

/// Graph-similarity measure over identity-matched overlap.
///
/// The `Unweighted` variants size graphs by `|V| + |E|` regardless of the
/// graphs' weighted mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphSimilarity {
    /// Overlap size over the larger graph's size.
    Mcs,
    /// Mcs on vertex and edge counts only.
    McsUnweighted,
    /// Overlap size over the size of the weighted graph union (Jaccard-style).
    Wgu,
    /// Wgu on vertex and edge counts only.
    WguUnweighted,
}

impl GraphSimilarity {
    /// Parse a measure name (case-insensitive). Returns `None` for unknown
    /// names.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mcs" => Some(Self::Mcs),
            "mcs_unweighted" => Some(Self::McsUnweighted),
            "wgu" => Some(Self::Wgu),
            "wgu_unweighted" => Some(Self::WguUnweighted),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mcs => "mcs",
            Self::McsUnweighted => "mcs_unweighted",
            Self::Wgu => "wgu",
            Self::WguUnweighted => "wgu_unweighted",
        }
    }

    #[must_use]
    pub const fn uses_weights(self) -> bool {
        matches!(self, Self::Mcs | Self::Wgu)
    }

    /// Similarity in `[0, 1]`; `1.0` for equal graphs, `0.0` when the graphs
    /// share no vertex.
    #[must_use]
    pub fn similarity(self, a: &FusionGraph, b: &FusionGraph) -> f64 {
        if a == b {
            return 1.0;
        }
        let use_weights = self.uses_weights();
        let overlap = match common_overlap(a, b, use_weights) {
            Some(overlap) => overlap.size(use_weights),
            None => return 0.0,
        };
        let size_a = a.size(use_weights);
        let size_b = b.size(use_weights);
        match self {
            Self::Mcs | Self::McsUnweighted => overlap / size_a.max(size_b),
            Self::Wgu | Self::WguUnweighted => overlap / (size_a + size_b - overlap),
        }
    }

    #[must_use]
    pub fn distance(self, a: &FusionGraph, b: &FusionGraph) -> f64 {
        1.0 - self.similarity(a, b)
    }
}

/// Identity-matched overlap of `a` and `b`, or `None` when no vertex is
/// shared. Overlap vertex and edge weights are the minimum of the two sides
/// when `use_weights` and both graphs are weighted.
#[must_use]
pub fn common_overlap(a: &FusionGraph, b: &FusionGraph, use_weights: bool) -> Option<FusionGraph> {
    let weighted = use_weights && a.is_weighted() && b.is_weighted();
    let common: Vec<_> = a.vertex_ids().filter(|&id| b.contains_vertex(id)).collect();
    if common.is_empty() {
        return None;
    }
    let mut overlap = FusionGraph::new(weighted);
    for &id in &common {
        let weight = if weighted {
            a.vertex_weight(id)
                .unwrap_or(0.0)
                .min(b.vertex_weight(id).unwrap_or(0.0))
        } else {
            1.0
        };
        overlap.add_vertex(id, weight);
    }
    for &source in &common {
        for edge in a.outgoing(source) {
            let Some(weight_b) = b.edge_weight(source, edge.target, &edge.label) else {
                continue;
            };
            let weight = if weighted {
                edge.weight.min(weight_b)
            } else {
                1.0
            };
            overlap.add_edge(source, edge.target, &edge.label, weight);
        }
    }
    Some(overlap)
}

/// Minimum common supergraph: the union of `a` and `b` where shared vertices
/// and shared `(source, target, label)` edges keep the larger of the two
/// weights. Weighted graphs only.
pub fn minimum_common_supergraph(a: &FusionGraph, b: &FusionGraph) -> FuseResult<FusionGraph> {
    if !a.is_weighted() || !b.is_weighted() {
        return Err(FuseError::Unsupported {
            operation: "minimum common supergraph",
            reason: "both graphs must be weighted".into(),
        });
    }
    let mut union = FusionGraph::new(true);
    for id in a.vertex_ids() {
        union.add_vertex(id, a.vertex_weight(id).unwrap_or(0.0));
    }
    for id in b.vertex_ids() {
        union.add_vertex_max(id, b.vertex_weight(id).unwrap_or(0.0))?;
    }
    for (source, edge) in a.edges() {
        union.add_edge(source, edge.target, &edge.label, edge.weight);
    }
    for (source, edge) in b.edges() {
        union.add_edge_max(source, edge.target, &edge.label, edge.weight)?;
    }
    Ok(union)
}
