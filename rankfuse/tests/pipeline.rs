//! End-to-end pipeline: descriptor ranks through fusion graphs to a final
//! graph-similarity ranking and its quality measurement.

use std::path::Path;

use rankfuse::{
    aggregate_ranks, evaluate_rank_dir, generate_self_pairwise, load_graph_records,
    rank_from_fused_graphs, AggregationConfig, GraphSimilarity, ItemId, LabelIndex, RerankMode,
};

/// Synthetic labeled corpus: two well-separated classes along a line, with
/// two noisy "descriptors" that mostly agree on class structure.
fn corpus() -> Vec<(ItemId, &'static str, f32, f32)> {
    vec![
        (1, "near", 0.0, 0.1),
        (2, "near", 0.2, 0.0),
        (3, "near", 0.4, 0.3),
        (4, "far", 5.0, 5.2),
        (5, "far", 5.3, 5.0),
        (6, "far", 5.6, 5.4),
    ]
}

fn labels() -> LabelIndex {
    LabelIndex::from_pairs(corpus().into_iter().map(|(id, label, _, _)| (id, label.to_string())))
}

fn closeness(a: &f32, b: &f32) -> f32 {
    1.0 / (1.0 + (a - b).abs())
}

/// Generate one rank directory per descriptor from the corpus features.
fn write_descriptor_ranks(dir_a: &Path, dir_b: &Path) {
    let first: Vec<(ItemId, f32)> = corpus().into_iter().map(|(id, _, a, _)| (id, a)).collect();
    let second: Vec<(ItemId, f32)> = corpus().into_iter().map(|(id, _, _, b)| (id, b)).collect();
    generate_self_pairwise(first, closeness, Some(4), true, Some(dir_a)).unwrap();
    generate_self_pairwise(second, closeness, Some(4), true, Some(dir_b)).unwrap();
}

#[test]
fn fused_ranking_recovers_class_structure() {
    let ranks_a = tempfile::tempdir().unwrap();
    let ranks_b = tempfile::tempdir().unwrap();
    let graphs = tempfile::tempdir().unwrap();
    let fused = tempfile::tempdir().unwrap();
    write_descriptor_ranks(ranks_a.path(), ranks_b.path());

    let labels = labels();
    let config = AggregationConfig {
        rank_size: Some(4),
        ..AggregationConfig::default()
    };
    let written = aggregate_ranks(
        &[ranks_a.path(), ranks_b.path()],
        None,
        Some(&labels),
        graphs.path(),
        &config,
    )
    .unwrap();
    assert_eq!(written, 6);

    // Every record carries its query's label.
    let records = load_graph_records(graphs.path()).unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].labels, vec!["near".to_string()]);
    assert_eq!(records[5].labels, vec!["far".to_string()]);

    let final_ranks =
        rank_from_fused_graphs(graphs.path(), GraphSimilarity::Wgu, Some(4), fused.path()).unwrap();
    assert_eq!(final_ranks.len(), 6);

    // Each query's top-4 neighborhood is its own class: itself plus the two
    // class mates ahead of anything off-class.
    for (query_id, rank) in &final_ranks {
        assert_eq!(rank.get(0).unwrap().id, *query_id);
        let own_label = labels.label_of(*query_id).unwrap();
        for entry in rank.iter().take(3) {
            assert_eq!(
                labels.label_of(entry.id),
                Some(own_label),
                "query {query_id} leaked {} into its class neighborhood",
                entry.id
            );
        }
    }

    // Quality of the final ranking: with self included in the top-4 cut,
    // two of three same-class mates are reachable per query.
    let quality = evaluate_rank_dir(fused.path(), &labels, 4, Some(4)).unwrap();
    assert_eq!(quality.num_queries(), 6);
    // Every query retrieves itself + both class mates: 3 relevant of 4.
    for precision in &quality.precisions {
        assert!((precision - 0.75).abs() < 1e-6);
    }
    for recall in &quality.recalls {
        // max_relevant excludes the query itself (2 mates), both retrieved,
        // but the self hit also counts as relevant retrieved: 3 / 2.
        assert!((recall - 1.5).abs() < 1e-6);
    }
    assert!(quality.map.is_some());
}

#[test]
fn reranked_aggregation_still_covers_all_queries() {
    let ranks_a = tempfile::tempdir().unwrap();
    let ranks_b = tempfile::tempdir().unwrap();
    let graphs = tempfile::tempdir().unwrap();
    write_descriptor_ranks(ranks_a.path(), ranks_b.path());

    let config = AggregationConfig {
        rank_size: Some(4),
        rerank: RerankMode::Reciprocal,
        rerank_load_size: Some(4),
        normalize_linear: true,
        ..AggregationConfig::default()
    };
    let written = aggregate_ranks(
        &[ranks_a.path(), ranks_b.path()],
        None,
        None,
        graphs.path(),
        &config,
    )
    .unwrap();
    assert_eq!(written, 6);

    let records = load_graph_records(graphs.path()).unwrap();
    for record in &records {
        assert!(record.graph.vertex_count() >= 4);
        assert!(record.labels.is_empty());
    }
}
