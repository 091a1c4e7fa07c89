//! Rank generation from pairwise similarity functions.
//!
//! Two modes live here: self-pairwise generation, where the same collection
//! serves as queries and responses and each symmetric pair is computed once,
//! and cross-set generation, where a distinct query collection is evaluated
//! against a response collection query by query. Generation from a
//! precomputed distance matrix lives in [`crate::matrix`].

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use rankfuse_core::{FuseError, FuseResult, ItemId, RankedList, RankedListBuilder};

/// Generate one bounded rank per sample, using the collection as both query
/// and response set.
///
/// Samples are sorted by id first so ranks (and the quality measurements
/// derived from them) are comparable across runs. The similarity function is
/// evaluated once per unordered pair and the result posted into both lists;
/// each sample's own list additionally gets a self-entry with maximal score.
/// The collection is consumed, releasing the samples once scores are
/// accumulated.
///
/// Results are normalized into `[0, 1]` when `normalize` and persisted one
/// file per id when `output_dir` is given.
#[instrument(
    name = "rankfuse::rank_generate",
    target = "rankfuse.generator",
    skip_all,
    fields(samples = samples.len(), rank_size)
)]
pub fn generate_self_pairwise<T, F>(
    mut samples: Vec<(ItemId, T)>,
    similarity: F,
    rank_size: Option<usize>,
    normalize: bool,
    output_dir: Option<&Path>,
) -> FuseResult<Vec<(ItemId, RankedList)>>
where
    T: Sync,
    F: Fn(&T, &T) -> f32 + Sync,
{
    if samples.is_empty() {
        return Err(FuseError::InvalidConfig {
            field: "samples",
            value: "0".into(),
            reason: "self-pairwise generation needs at least one sample".into(),
        });
    }
    samples.sort_by_key(|(id, _)| *id);

    let builders: Vec<RankedListBuilder> = samples
        .iter()
        .map(|(id, _)| {
            let builder = RankedListBuilder::new(rank_size, true);
            builder.add(*id, 1.0);
            builder
        })
        .collect();

    // Each unordered pair once, posted to both sides; the builders
    // serialize concurrent adds internally.
    let n = samples.len();
    (0..n).into_par_iter().for_each(|i| {
        for j in (i + 1)..n {
            let score = similarity(&samples[i].1, &samples[j].1);
            builders[i].add(samples[j].0, score);
            builders[j].add(samples[i].0, score);
        }
    });

    let ids: Vec<ItemId> = samples.iter().map(|(id, _)| *id).collect();
    drop(samples);

    let mut ranks: Vec<(ItemId, RankedList)> = ids
        .into_iter()
        .zip(builders)
        .map(|(id, builder)| (id, builder.materialize()))
        .collect();

    if normalize {
        for (_, rank) in &mut ranks {
            rank.normalize(0.0, 1.0);
        }
    }

    if let Some(dir) = output_dir {
        for (id, rank) in &ranks {
            rank.save_to_dir(*id, dir)?;
        }
    }

    info!(
        target: "rankfuse.generator",
        ranks = ranks.len(),
        normalize,
        persisted = output_dir.is_some(),
        "self-pairwise ranks generated"
    );
    Ok(ranks)
}

/// Generate and persist one bounded rank per query against a distinct
/// response collection. Queries are independent and processed in parallel.
#[instrument(
    name = "rankfuse::rank_generate",
    target = "rankfuse.generator",
    skip_all,
    fields(queries = queries.len(), responses = responses.len(), rank_size)
)]
pub fn generate_cross_set<T, F>(
    queries: &[(ItemId, T)],
    responses: &[(ItemId, T)],
    similarity: F,
    rank_size: Option<usize>,
    normalize: bool,
    output_dir: &Path,
) -> FuseResult<()>
where
    T: Sync,
    F: Fn(&T, &T) -> f32 + Sync,
{
    queries.par_iter().try_for_each(|(query_id, query)| {
        let mut rank = generate_rank(query, responses, &similarity, rank_size);
        if normalize {
            rank.normalize(0.0, 1.0);
        }
        rank.save_to_dir(*query_id, output_dir)
    })?;
    debug!(
        target: "rankfuse.generator",
        queries = queries.len(),
        "cross-set ranks generated"
    );
    Ok(())
}

/// Rank all `responses` for one query.
pub fn generate_rank<T, F>(
    query: &T,
    responses: &[(ItemId, T)],
    similarity: F,
    rank_size: Option<usize>,
) -> RankedList
where
    F: Fn(&T, &T) -> f32,
{
    let builder = RankedListBuilder::new(rank_size, true);
    for (response_id, response) in responses {
        builder.add(*response_id, similarity(query, response));
    }
    builder.materialize()
}
