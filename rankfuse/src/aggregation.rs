//! Fusion-graph aggregation: per-descriptor ranks in, one consensus graph
//! per query out, then a graph-similarity final ranking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use rankfuse_core::{
    needs_compute, FlatStore, FuseError, FuseResult, ItemId, RankedList, SampleStore,
};
use rankfuse_eval::{LabelIndex, LabeledQuerySet, QualityMeasurer, QualityQueries};
use rankfuse_graph::{build_fusion_graph, graph_file, GraphRecord, GraphSimilarity};

use crate::loader::{load_rank_dir, load_ranks_for_aggregation, RerankMode};

/// Settings for one aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Rank length entering fusion (per descriptor, after rerank).
    pub rank_size: Option<usize>,
    /// Mutual-neighbor rerank applied while loading descriptor ranks.
    pub rerank: RerankMode,
    /// Entries read per raw rank when reranking.
    pub rerank_load_size: Option<usize>,
    /// Position-linear `[0.1, 1]` score mapping instead of decreasing
    /// normalization.
    pub normalize_linear: bool,
    /// Resume an interrupted run: keep complete per-query outputs, redo
    /// missing or zero-length ones.
    pub incremental: bool,
    /// Write graph records in the compressed edge layout.
    pub compress_graphs: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            rank_size: None,
            rerank: RerankMode::None,
            rerank_load_size: None,
            normalize_linear: false,
            incremental: false,
            compress_graphs: false,
        }
    }
}

/// Build and persist one fusion graph per query.
///
/// `responses` provides the second-hop ranks (the same map as `queries` when
/// query and response sets coincide). `labels`, when given, stamps each
/// record with its query's ground-truth label. Queries are independent and
/// processed in parallel; with `incremental`, existing complete outputs are
/// kept and the whole stage is skipped when every query already has one.
/// Returns the number of graphs written.
#[instrument(
    name = "rankfuse::fusion_graph",
    target = "rankfuse.aggregation",
    skip_all,
    fields(queries = queries.len(), incremental = config.incremental)
)]
pub fn generate_fusion_graphs(
    queries: &HashMap<ItemId, Vec<RankedList>>,
    responses: &HashMap<ItemId, Vec<RankedList>>,
    labels: Option<&LabelIndex>,
    output_dir: &Path,
    config: &AggregationConfig,
) -> FuseResult<usize> {
    let store = FlatStore::new(output_dir);
    if store.exists() && store.count_files() >= queries.len() {
        info!(
            target: "rankfuse.aggregation",
            dir = %output_dir.display(),
            "fusion graphs already complete, skipping"
        );
        return Ok(0);
    }
    store.initialize(config.incremental)?;

    let written = AtomicUsize::new(0);
    queries.par_iter().try_for_each(|(&query_id, ranks)| {
        let path = graph_file(output_dir, query_id);
        if config.incremental && !needs_compute(&path)? {
            return Ok(());
        }
        let graph = build_fusion_graph(query_id, ranks, |id| {
            responses.get(&id).map(Vec::as_slice)
        })?;
        let record_labels = labels
            .and_then(|index| index.label_of(query_id))
            .map(|label| vec![label.to_string()])
            .unwrap_or_default();
        GraphRecord::new(query_id, record_labels, graph).save(&path, config.compress_graphs)?;
        written.fetch_add(1, Ordering::Relaxed);
        Ok::<(), FuseError>(())
    })?;

    let written = written.into_inner();
    info!(
        target: "rankfuse.aggregation",
        written,
        dir = %output_dir.display(),
        "fusion graphs generated"
    );
    Ok(written)
}

/// Full aggregation pass over persisted per-descriptor rank directories.
///
/// With `response_dirs = None`, the query set is also the response set and
/// the query ranks serve as their own second hop. With distinct response
/// directories, response-vs-response graphs are additionally generated under
/// `output_dir/responses` (the similarity stage queries them); reranking and
/// labels are not supported in that layout.
pub fn aggregate_ranks(
    query_dirs: &[&Path],
    response_dirs: Option<&[&Path]>,
    labels: Option<&LabelIndex>,
    output_dir: &Path,
    config: &AggregationConfig,
) -> FuseResult<usize> {
    match response_dirs {
        None => {
            let ranks = load_ranks_for_aggregation(
                query_dirs,
                config.rank_size,
                config.rerank,
                config.rerank_load_size,
                config.normalize_linear,
            )?;
            generate_fusion_graphs(&ranks, &ranks, labels, output_dir, config)
        }
        Some(response_dirs) => {
            if config.rerank.is_enabled() {
                return Err(FuseError::Unsupported {
                    operation: "reranking",
                    reason: "query and response sets differ".into(),
                });
            }
            if labels.is_some() {
                return Err(FuseError::Unsupported {
                    operation: "labeled fusion graphs",
                    reason: "query and response sets differ".into(),
                });
            }
            let queries = load_ranks_for_aggregation(
                query_dirs,
                config.rank_size,
                RerankMode::None,
                None,
                config.normalize_linear,
            )?;
            let responses = load_ranks_for_aggregation(
                response_dirs,
                config.rank_size,
                RerankMode::None,
                None,
                config.normalize_linear,
            )?;
            let mut written =
                generate_fusion_graphs(&queries, &responses, None, output_dir, config)?;
            // The final ranking stage queries response graphs against each
            // other, so generate those too.
            written += generate_fusion_graphs(
                &responses,
                &responses,
                None,
                &output_dir.join("responses"),
                config,
            )?;
            Ok(written)
        }
    }
}

/// Load every persisted graph record under `dir`, sorted by id.
pub fn load_graph_records(dir: &Path) -> FuseResult<Vec<GraphRecord>> {
    let store = FlatStore::new(dir);
    let mut records = Vec::new();
    for path in store.list_files()? {
        records.push(GraphRecord::load(&path)?);
    }
    records.sort_by_key(|record| record.id);
    debug!(target: "rankfuse.aggregation", records = records.len(), "graph records loaded");
    Ok(records)
}

/// Final ranking stage: rank fusion graphs against each other with a graph
/// similarity measure, reusing the self-pairwise generator. Ranks are
/// normalized and persisted one file per query id under `output_dir`.
#[instrument(
    name = "rankfuse::graph_rank",
    target = "rankfuse.aggregation",
    skip_all,
    fields(measure = measure.name())
)]
pub fn rank_from_fused_graphs(
    graphs_dir: &Path,
    measure: GraphSimilarity,
    rank_size: Option<usize>,
    output_dir: &Path,
) -> FuseResult<Vec<(ItemId, RankedList)>> {
    let samples: Vec<(ItemId, GraphRecord)> = load_graph_records(graphs_dir)?
        .into_iter()
        .map(|record| (record.id, record))
        .collect();
    std::fs::create_dir_all(output_dir)?;
    crate::generator::generate_self_pairwise(
        samples,
        |a, b| measure.similarity(&a.graph, &b.graph) as f32,
        rank_size,
        true,
        Some(output_dir),
    )
}

/// Evaluate a persisted rank directory against label ground truth.
///
/// Cutoff metrics use the first `cutoff` entries of each rank; mean average
/// precision consumes the full ranks (checked against `expected_rank_size`
/// when given). Queries are evaluated in ascending id order.
pub fn evaluate_rank_dir(
    ranks_dir: &Path,
    labels: &LabelIndex,
    cutoff: usize,
    expected_rank_size: Option<usize>,
) -> FuseResult<QualityQueries> {
    let ranks = load_rank_dir(ranks_dir, None, RerankMode::None, None)?;
    let queries: Vec<(ItemId, Vec<ItemId>)> = ranks
        .into_iter()
        .map(|(id, rank)| (id, rank.ids()))
        .collect();
    let set = LabeledQuerySet::new(queries, labels);
    QualityMeasurer::new(expected_rank_size).measure(&set, cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankfuse_core::RankEntry;

    fn list(entries: &[(u64, f32)]) -> RankedList {
        RankedList::from_entries(
            entries
                .iter()
                .map(|&(id, score)| RankEntry { id, score })
                .collect(),
            true,
        )
    }

    fn toy_ranks() -> HashMap<ItemId, Vec<RankedList>> {
        let mut ranks = HashMap::new();
        ranks.insert(1, vec![list(&[(1, 1.0), (2, 0.8), (3, 0.2)])]);
        ranks.insert(2, vec![list(&[(2, 1.0), (1, 0.7), (3, 0.3)])]);
        ranks.insert(3, vec![list(&[(3, 1.0), (2, 0.5), (1, 0.4)])]);
        ranks
    }

    #[test]
    fn generates_one_graph_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let ranks = toy_ranks();
        let config = AggregationConfig::default();
        let written =
            generate_fusion_graphs(&ranks, &ranks, None, dir.path(), &config).unwrap();
        assert_eq!(written, 3);

        let records = load_graph_records(dir.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].graph.vertex_count(), 3);
        assert!(records[0].graph.is_weighted());
    }

    #[test]
    fn complete_output_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ranks = toy_ranks();
        let config = AggregationConfig::default();
        generate_fusion_graphs(&ranks, &ranks, None, dir.path(), &config).unwrap();
        // Second run finds one file per query and does nothing.
        let written =
            generate_fusion_graphs(&ranks, &ranks, None, dir.path(), &config).unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn incremental_run_redoes_only_missing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let ranks = toy_ranks();
        let config = AggregationConfig {
            incremental: true,
            ..AggregationConfig::default()
        };
        generate_fusion_graphs(&ranks, &ranks, None, dir.path(), &config).unwrap();

        // Simulate a crash: one output gone, one truncated to zero length.
        std::fs::remove_file(graph_file(dir.path(), 1)).unwrap();
        std::fs::write(graph_file(dir.path(), 2), "").unwrap();

        let written = generate_fusion_graphs(&ranks, &ranks, None, dir.path(), &config).unwrap();
        assert_eq!(written, 2);
        assert_eq!(load_graph_records(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn labels_are_stamped_on_records() {
        let dir = tempfile::tempdir().unwrap();
        let ranks = toy_ranks();
        let labels = LabelIndex::from_pairs([
            (1, "building".to_string()),
            (2, "building".to_string()),
            (3, "car".to_string()),
        ]);
        let config = AggregationConfig::default();
        generate_fusion_graphs(&ranks, &ranks, Some(&labels), dir.path(), &config).unwrap();

        let records = load_graph_records(dir.path()).unwrap();
        assert_eq!(records[0].labels, vec!["building".to_string()]);
        assert_eq!(records[2].labels, vec!["car".to_string()]);
    }

    #[test]
    fn distinct_sets_reject_rerank() {
        let dir = tempfile::tempdir().unwrap();
        let config = AggregationConfig {
            rerank: RerankMode::Simple,
            ..AggregationConfig::default()
        };
        let err = aggregate_ranks(
            &[dir.path()],
            Some(&[dir.path()]),
            None,
            dir.path(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, FuseError::Unsupported { .. }));
    }

    #[test]
    fn graph_ranking_puts_similar_graphs_first() {
        let graphs = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        // Queries 1 and 2 share most of their neighborhoods; 3 is disjoint
        // except through itself.
        let mut ranks = HashMap::new();
        ranks.insert(1, vec![list(&[(1, 1.0), (2, 0.9), (4, 0.8)])]);
        ranks.insert(2, vec![list(&[(2, 1.0), (1, 0.9), (4, 0.7)])]);
        ranks.insert(3, vec![list(&[(3, 1.0), (5, 0.9), (6, 0.8)])]);
        ranks.insert(4, vec![list(&[(4, 1.0), (1, 0.6)])]);
        ranks.insert(5, vec![list(&[(5, 1.0), (3, 0.6)])]);
        ranks.insert(6, vec![list(&[(6, 1.0), (3, 0.5)])]);
        let config = AggregationConfig::default();
        generate_fusion_graphs(&ranks, &ranks, None, graphs.path(), &config).unwrap();

        let final_ranks =
            rank_from_fused_graphs(graphs.path(), GraphSimilarity::Mcs, None, out.path()).unwrap();
        let (_, rank_of_1) = final_ranks.iter().find(|(id, _)| *id == 1).unwrap();
        // Self first; 2 (shared vertices 1, 2, 4) beats 3 (no shared vertex).
        assert_eq!(rank_of_1.get(0).unwrap().id, 1);
        let pos_2 = rank_of_1.position_and_score_of(2).unwrap().0;
        let pos_3 = rank_of_1.position_and_score_of(3).unwrap().0;
        assert!(pos_2 < pos_3);

        // Persisted alongside.
        let reloaded = RankedList::load_from_dir(out.path(), 1, None).unwrap();
        assert_eq!(reloaded.ids(), rank_of_1.ids());
    }

    #[test]
    fn evaluation_of_a_rank_directory() {
        let ranks_dir = tempfile::tempdir().unwrap();
        // Query 1 retrieves its class mate 2 first; query 2 retrieves an
        // off-class item first.
        list(&[(2, 0.9), (3, 0.1)]).save_to_dir(1, ranks_dir.path()).unwrap();
        list(&[(3, 0.9), (1, 0.1)]).save_to_dir(2, ranks_dir.path()).unwrap();
        let labels = LabelIndex::from_pairs([
            (1, "a".to_string()),
            (2, "a".to_string()),
            (3, "b".to_string()),
        ]);

        let quality = evaluate_rank_dir(ranks_dir.path(), &labels, 2, Some(2)).unwrap();
        assert_eq!(quality.num_queries(), 2);
        assert!((quality.precisions[0] - 0.5).abs() < 1e-6);
        assert!((quality.recalls[0] - 1.0).abs() < 1e-6);
        assert!((quality.precisions[1] - 0.5).abs() < 1e-6);
        assert!(quality.map.is_some());
    }

    #[test]
    fn config_serde_round_trip() {
        let config = AggregationConfig {
            rank_size: Some(20),
            rerank: RerankMode::Reciprocal,
            rerank_load_size: Some(400),
            normalize_linear: true,
            incremental: true,
            compress_graphs: true,
        };
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: AggregationConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.rank_size, Some(20));
        assert_eq!(decoded.rerank, RerankMode::Reciprocal);
        assert!(decoded.compress_graphs);
    }
}
