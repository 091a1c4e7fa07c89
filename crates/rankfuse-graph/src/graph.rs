//! Directed, labeled, optionally weighted fusion graphs.
//!
//! Vertices are item ids; vertex weight accumulates consensus evidence.
//! Edges carry a label and a weight; multiple edges between the same ordered
//! pair are allowed under different labels, and re-adding an edge with the
//! same `(source, target, label)` accumulates its weight. A graph's weighted
//! mode is fixed at creation: vertex and edge weights are only meaningful on
//! weighted graphs.
//!
//! Adjacency is a `BTreeMap` so vertex iteration (and therefore
//! serialization) is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rankfuse_core::normalize::rescale_f64;
use rankfuse_core::{FuseError, FuseResult, ItemId};

/// One directed edge to `target`, carrying a label and a weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub target: ItemId,
    pub label: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Vertex {
    weight: f64,
    edges: Vec<Edge>,
}

/// Weighted labeled digraph used both for per-query fusion graphs and for
/// their common-overlap graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionGraph {
    weighted: bool,
    vertices: BTreeMap<ItemId, Vertex>,
}

impl FusionGraph {
    /// Create an empty graph; `weighted` is fixed for its lifetime.
    #[must_use]
    pub fn new(weighted: bool) -> Self {
        Self {
            weighted,
            vertices: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn is_weighted(&self) -> bool {
        self.weighted
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.vertices.values().map(|vertex| vertex.edges.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[must_use]
    pub fn contains_vertex(&self, id: ItemId) -> bool {
        self.vertices.contains_key(&id)
    }

    /// Insert `id`, accumulating `weight` onto an existing vertex.
    /// On unweighted graphs the weight argument is ignored.
    pub fn add_vertex(&mut self, id: ItemId, weight: f64) {
        let vertex = self.vertices.entry(id).or_default();
        if self.weighted {
            vertex.weight += weight;
        }
    }

    /// Insert `id`, keeping the maximum of the existing and new weight.
    /// Used by the minimum-common-supergraph construction; weighted only.
    pub fn add_vertex_max(&mut self, id: ItemId, weight: f64) -> FuseResult<()> {
        if !self.weighted {
            return Err(FuseError::Unsupported {
                operation: "vertex weight maximization",
                reason: "graph is unweighted".into(),
            });
        }
        match self.vertices.entry(id) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(Vertex {
                    weight,
                    edges: Vec::new(),
                });
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                let vertex = entry.get_mut();
                if vertex.weight < weight {
                    vertex.weight = weight;
                }
            }
        }
        Ok(())
    }

    /// Weight of `id`: `1.0` on unweighted graphs, `None` when absent.
    #[must_use]
    pub fn vertex_weight(&self, id: ItemId) -> Option<f64> {
        self.vertices
            .get(&id)
            .map(|vertex| if self.weighted { vertex.weight } else { 1.0 })
    }

    /// Vertex ids in ascending order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.vertices.keys().copied()
    }

    /// Insert or accumulate the edge `(source, target, label)`.
    ///
    /// Missing endpoints are inserted with zero vertex weight; fusion-graph
    /// construction checks membership first, so this path only triggers for
    /// callers that intentionally build edge-first graphs.
    pub fn add_edge(&mut self, source: ItemId, target: ItemId, label: &str, weight: f64) {
        if !self.vertices.contains_key(&target) {
            self.add_vertex(target, 0.0);
        }
        let weighted = self.weighted;
        let vertex = self.vertices.entry(source).or_default();
        if let Some(edge) = vertex
            .edges
            .iter_mut()
            .find(|edge| edge.target == target && edge.label == label)
        {
            if weighted {
                edge.weight += weight;
            }
            return;
        }
        vertex.edges.push(Edge {
            target,
            label: label.to_string(),
            weight: if weighted { weight } else { 1.0 },
        });
    }

    /// Insert the edge, keeping the maximum weight when it already exists.
    /// Weighted only.
    pub fn add_edge_max(
        &mut self,
        source: ItemId,
        target: ItemId,
        label: &str,
        weight: f64,
    ) -> FuseResult<()> {
        if !self.weighted {
            return Err(FuseError::Unsupported {
                operation: "edge weight maximization",
                reason: "graph is unweighted".into(),
            });
        }
        if !self.vertices.contains_key(&target) {
            self.add_vertex(target, 0.0);
        }
        let vertex = self.vertices.entry(source).or_default();
        if let Some(edge) = vertex
            .edges
            .iter_mut()
            .find(|edge| edge.target == target && edge.label == label)
        {
            if edge.weight < weight {
                edge.weight = weight;
            }
            return Ok(());
        }
        vertex.edges.push(Edge {
            target,
            label: label.to_string(),
            weight,
        });
        Ok(())
    }

    /// Outgoing edges of `source` (empty when the vertex is missing).
    #[must_use]
    pub fn outgoing(&self, source: ItemId) -> &[Edge] {
        self.vertices
            .get(&source)
            .map_or(&[], |vertex| vertex.edges.as_slice())
    }

    /// Weight of the edge `(source, target, label)`: `1.0` per edge on
    /// unweighted graphs, `None` when absent.
    #[must_use]
    pub fn edge_weight(&self, source: ItemId, target: ItemId, label: &str) -> Option<f64> {
        self.outgoing(source)
            .iter()
            .find(|edge| edge.target == target && edge.label == label)
            .map(|edge| if self.weighted { edge.weight } else { 1.0 })
    }

    /// All edges as `(source, edge)` pairs, sources in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = (ItemId, &Edge)> {
        self.vertices
            .iter()
            .flat_map(|(&source, vertex)| vertex.edges.iter().map(move |edge| (source, edge)))
    }

    #[must_use]
    pub fn sum_vertex_weights(&self) -> f64 {
        if self.weighted {
            self.vertices.values().map(|vertex| vertex.weight).sum()
        } else {
            self.vertices.len() as f64
        }
    }

    #[must_use]
    pub fn sum_edge_weights(&self) -> f64 {
        if self.weighted {
            self.edges().map(|(_, edge)| edge.weight).sum()
        } else {
            self.edge_count() as f64
        }
    }

    /// Graph size: sum of vertex plus edge weights when `use_weights` and
    /// the graph is weighted, otherwise `|V| + |E|`.
    #[must_use]
    pub fn size(&self, use_weights: bool) -> f64 {
        if use_weights && self.weighted {
            self.sum_vertex_weights() + self.sum_edge_weights()
        } else {
            (self.vertex_count() + self.edge_count()) as f64
        }
    }

    /// Rescale all vertex weights and, independently, all edge weights into
    /// `[min, max]`. Fatal on unweighted graphs.
    pub fn normalize_weights(&mut self, min: f64, max: f64) -> FuseResult<()> {
        if !self.weighted {
            return Err(FuseError::Unsupported {
                operation: "weight normalization",
                reason: "graph is unweighted".into(),
            });
        }
        let mut vertex_weights: Vec<f64> =
            self.vertices.values().map(|vertex| vertex.weight).collect();
        rescale_f64(&mut vertex_weights, min, max);
        for (vertex, weight) in self.vertices.values_mut().zip(vertex_weights) {
            vertex.weight = weight;
        }

        let mut edge_weights: Vec<f64> = self
            .vertices
            .values()
            .flat_map(|vertex| vertex.edges.iter().map(|edge| edge.weight))
            .collect();
        rescale_f64(&mut edge_weights, min, max);
        let mut next = edge_weights.into_iter();
        for vertex in self.vertices.values_mut() {
            for edge in &mut vertex.edges {
                edge.weight = next.next().expect("edge count changed mid-normalize");
            }
        }
        Ok(())
    }
}
