//! Consensus fusion graph for one query.
//!
//! Vertex weights aggregate first-order evidence: every appearance of an item
//! in one of the query's per-descriptor ranks contributes its score. Edge
//! weights aggregate second-order evidence: each ranked item acts as a
//! second-hop query through its own ranks, and every neighbor it agrees on
//! receives a directed edge weighted by the neighbor's score decayed by the
//! first hop's position. Scores are expected to be pre-normalized so that
//! descriptors contribute on a comparable scale.

use tracing::{debug, instrument};

use rankfuse_core::{FuseResult, ItemId, RankedList};

use crate::graph::FusionGraph;

/// Build the fusion graph for `query_id` from its per-descriptor ranks.
///
/// `second_hop` resolves any ranked item to that item's own per-descriptor
/// ranks; items it cannot resolve contribute no outgoing edges. The returned
/// graph has all vertex and edge weights rescaled into `[0, 1]`
/// independently.
#[instrument(
    name = "rankfuse::fusion_graph",
    target = "rankfuse.fusion",
    skip_all,
    fields(query_id)
)]
pub fn build_fusion_graph<'a, F>(
    query_id: ItemId,
    ranks: &[RankedList],
    second_hop: F,
) -> FuseResult<FusionGraph>
where
    F: Fn(ItemId) -> Option<&'a [RankedList]>,
{
    let mut graph = FusionGraph::new(true);

    for rank in ranks {
        for entry in rank {
            graph.add_vertex(entry.id, f64::from(entry.score));
        }
    }

    for rank in ranks {
        for (index, entry) in rank.iter().enumerate() {
            let position = (index + 1) as f64;
            let Some(own_ranks) = second_hop(entry.id) else {
                continue;
            };
            for own_rank in own_ranks {
                for neighbor in own_rank {
                    if neighbor.id == entry.id
                        || !graph.contains_vertex(entry.id)
                        || !graph.contains_vertex(neighbor.id)
                    {
                        continue;
                    }
                    graph.add_edge(
                        entry.id,
                        neighbor.id,
                        "",
                        f64::from(neighbor.score) / position,
                    );
                }
            }
        }
    }

    graph.normalize_weights(0.0, 1.0)?;
    debug!(
        target: "rankfuse.fusion",
        query_id,
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "fusion graph built"
    );
    Ok(graph)
}
