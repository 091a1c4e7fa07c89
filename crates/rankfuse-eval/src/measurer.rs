//! Rank-quality measurement against ground-truth relevance.
//!
//! Cutoff metrics (precision, recall, AP, NDCG, N-S) are computed per query
//! at a fixed rank size. Mean average precision is computed separately, over
//! the full (uncut) ranks, as the exact area under the precision-recall
//! curve.

use tracing::{debug, instrument, warn};

use rankfuse_core::{FuseError, FuseResult, ItemId};

use crate::quality::QualityQueries;

/// One query's response list, either bare ids in rank order or explicit
/// `(0-based position, id)` pairs in arbitrary order.
#[derive(Debug, Clone)]
pub enum Responses {
    Plain(Vec<ItemId>),
    Positioned(Vec<(usize, ItemId)>),
}

impl Responses {
    /// Ids in rank order; positioned entries are sorted by position first.
    #[must_use]
    pub fn into_ordered_ids(self) -> Vec<ItemId> {
        match self {
            Self::Plain(ids) => ids,
            Self::Positioned(mut pairs) => {
                pairs.sort_by_key(|&(position, _)| position);
                pairs.into_iter().map(|(_, id)| id).collect()
            }
        }
    }

    /// `(rank position, id)` pairs in rank order. Plain ids get dense
    /// positions; positioned entries keep their stored (possibly sparse)
    /// positions.
    #[must_use]
    pub fn into_positioned(self) -> Vec<(usize, ItemId)> {
        match self {
            Self::Plain(ids) => ids.into_iter().enumerate().collect(),
            Self::Positioned(mut pairs) => {
                pairs.sort_by_key(|&(position, _)| position);
                pairs
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Plain(ids) => ids.len(),
            Self::Positioned(pairs) => pairs.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of queries under evaluation, indexed `0..len()`.
///
/// Queries must be ordered by non-decreasing id so that metric arrays from
/// repeated runs line up for paired comparison; [`QualityMeasurer::measure`]
/// enforces this.
pub trait QuerySet {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn query_id(&self, index: usize) -> ItemId;

    /// The query's response list. For the cutoff metrics the first
    /// `cutoff` entries are used; mean average precision consumes the whole
    /// list.
    fn responses(&self, index: usize) -> Responses;

    /// Whether `response` is relevant to the query at `index`.
    fn is_relevant(&self, index: usize, response: ItemId) -> bool;

    /// Number of truly relevant items for the query in the whole corpus.
    fn max_relevant(&self, index: usize) -> usize;
}

/// Computes [`QualityQueries`] from a [`QuerySet`].
#[derive(Debug, Clone, Default)]
pub struct QualityMeasurer {
    /// When set, every rank consumed by mean average precision must have
    /// exactly this length; any deviation downgrades MAP to unavailable.
    pub expected_rank_size: Option<usize>,
}

impl QualityMeasurer {
    #[must_use]
    pub fn new(expected_rank_size: Option<usize>) -> Self {
        Self { expected_rank_size }
    }

    /// Measure all metrics at `cutoff`, plus mean average precision over the
    /// uncut ranks.
    #[instrument(
        name = "rankfuse::evaluate",
        target = "rankfuse.eval",
        skip_all,
        fields(cutoff)
    )]
    pub fn measure(&self, source: &dyn QuerySet, cutoff: usize) -> FuseResult<QualityQueries> {
        let num_queries = source.len();
        let mut quality = QualityQueries::with_queries(num_queries);

        let mut last_id = 0;
        for index in 0..num_queries {
            let query_id = source.query_id(index);
            if index > 0 && last_id > query_id {
                return Err(FuseError::QueryOrderViolation {
                    index,
                    previous: last_id,
                    current: query_id,
                });
            }
            last_id = query_id;

            let ids = source.responses(index).into_ordered_ids();
            let max_relevant = source.max_relevant(index);

            let mut relevant_retrieved = 0_usize;
            let mut relevant_at_4 = 0_usize;
            let mut sum_precisions_at_hits = 0.0_f32;
            let mut relevant_flags = vec![false; cutoff.min(ids.len())];
            for (k, &id) in ids.iter().take(cutoff).enumerate() {
                if source.is_relevant(index, id) {
                    relevant_flags[k] = true;
                    relevant_retrieved += 1;
                    if k < 4 {
                        relevant_at_4 += 1;
                    }
                    sum_precisions_at_hits += relevant_retrieved as f32 / (k + 1) as f32;
                }
            }

            quality.precisions[index] = relevant_retrieved as f32 / cutoff as f32;
            quality.recalls[index] = relevant_retrieved as f32 / max_relevant as f32;
            quality.average_precisions[index] =
                sum_precisions_at_hits / max_relevant.min(cutoff) as f32;
            quality.ndcgs[index] = ndcg(&relevant_flags, cutoff, max_relevant);
            quality.ns_scores[index] = if cutoff >= 4 {
                relevant_at_4 as f32
            } else {
                f32::NAN
            };
        }

        quality.map = self.mean_average_precision(source);
        debug!(
            target: "rankfuse.eval",
            queries = num_queries,
            cutoff,
            map_available = quality.map.is_some(),
            "rank qualities measured"
        );
        Ok(quality)
    }

    /// Exact area under the precision-recall curve, averaged across queries.
    ///
    /// Response lists are assumed not to contain the query itself; if they
    /// do, those occurrences are skipped with a position shift so subsequent
    /// hits keep their effective rank. Returns `None` (with a warning) when
    /// an expected rank size was declared and any rank deviates from it, or
    /// when there are no queries.
    #[must_use]
    pub fn mean_average_precision(&self, source: &dyn QuerySet) -> Option<f32> {
        let num_queries = source.len();
        if num_queries == 0 {
            warn!(target: "rankfuse.eval", "MAP skipped: no queries to evaluate");
            return None;
        }

        let mut sum_ap = 0.0_f32;
        let mut min_size = usize::MAX;
        let mut max_size = 0_usize;
        for index in 0..num_queries {
            let query_id = source.query_id(index);
            // Stored positions, not dense enumeration: a positioned list may
            // be sparse, and a hit at rank 5 must score as rank 5.
            let entries = source.responses(index).into_positioned();
            if entries.is_empty() {
                continue;
            }
            min_size = min_size.min(entries.len());
            max_size = max_size.max(entries.len());

            let mut tp_ranks = Vec::new();
            let mut rank_shift = 0_isize;
            for &(position, id) in &entries {
                if id == query_id {
                    rank_shift -= 1;
                } else if source.is_relevant(index, id) {
                    tp_ranks.push((position as isize + rank_shift) as usize);
                }
            }
            sum_ap += trapezoid_ap(&tp_ranks, source.max_relevant(index));
        }

        if let Some(expected) = self.expected_rank_size {
            if expected != min_size || expected != max_size {
                warn!(
                    target: "rankfuse.eval",
                    queries = num_queries,
                    expected,
                    min_size,
                    max_size,
                    "MAP could not be reliably computed: ranks of unexpected size"
                );
                return None;
            }
        }
        Some(sum_ap / num_queries as f32)
    }
}

/// Binary-gain NDCG with logarithmic discount over `relevant_flags`
/// (0-indexed rank positions). The ideal DCG assumes the first
/// `min(max_relevant, cutoff)` positions are all relevant.
fn ndcg(relevant_flags: &[bool], cutoff: usize, max_relevant: usize) -> f32 {
    let ideal_hits = max_relevant.min(cutoff);
    let idcg = dcg((0..cutoff).map(|k| k < ideal_hits));
    if idcg == 0.0 {
        return 0.0;
    }
    let dcg = dcg(relevant_flags.iter().copied());
    dcg / idcg
}

fn dcg(relevance: impl Iterator<Item = bool>) -> f32 {
    let log_of_2 = std::f64::consts::LN_2;
    let mut sum = 0.0_f64;
    for (k, relevant) in relevance.enumerate() {
        if relevant {
            sum += log_of_2 / ((k + 2) as f64).ln();
        }
    }
    sum as f32
}

/// Area under the precision-recall curve of one query, summed as trapezoids
/// between consecutive true-positive ranks.
fn trapezoid_ap(tp_ranks: &[usize], max_positives: usize) -> f32 {
    let recall_step = 1.0 / max_positives as f64;
    let mut ap = 0.0_f32;
    for (count, &rank) in tp_ranks.iter().enumerate() {
        let precision_left = if rank == 0 {
            1.0
        } else {
            count as f32 / rank as f32
        };
        let precision_right = (count + 1) as f32 / (rank + 1) as f32;
        ap += ((precision_right + precision_left) as f64 * recall_step / 2.0) as f32;
    }
    ap
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory query set: `(query_id, responses, relevant ids, max_relevant)`.
    struct Fixture {
        queries: Vec<(ItemId, Responses, Vec<ItemId>, usize)>,
    }

    impl QuerySet for Fixture {
        fn len(&self) -> usize {
            self.queries.len()
        }

        fn query_id(&self, index: usize) -> ItemId {
            self.queries[index].0
        }

        fn responses(&self, index: usize) -> Responses {
            self.queries[index].1.clone()
        }

        fn is_relevant(&self, index: usize, response: ItemId) -> bool {
            self.queries[index].2.contains(&response)
        }

        fn max_relevant(&self, index: usize) -> usize {
            self.queries[index].3
        }
    }

    fn single(responses: Responses, relevant: Vec<ItemId>, max_relevant: usize) -> Fixture {
        Fixture {
            queries: vec![(1, responses, relevant, max_relevant)],
        }
    }

    // ─── Cutoff metrics ─────────────────────────────────────────────────

    #[test]
    fn precision_recall_at_cutoff() {
        // Relevant at ranks 0 and 2 of [10, 11, 12, 13]; 4 relevant overall.
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10, 12], 4);
        let q = QualityMeasurer::default().measure(&fixture, 4).unwrap();
        assert!((q.precisions[0] - 0.5).abs() < 1e-6);
        assert!((q.recalls[0] - 0.5).abs() < 1e-6);
        assert!((q.ns_scores[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn average_precision_sums_precisions_at_hits() {
        // Hits at positions 0 and 2: precisions 1/1 and 2/3, divided by
        // min(max_relevant, cutoff) = 2.
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10, 12], 2);
        let q = QualityMeasurer::default().measure(&fixture, 4).unwrap();
        let expected = (1.0 + 2.0 / 3.0) / 2.0;
        assert!((q.average_precisions[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn average_precision_is_one_for_single_relevant_at_top() {
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13, 14]), vec![10], 1);
        let q = QualityMeasurer::default().measure(&fixture, 5).unwrap();
        assert!((q.average_precisions[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ndcg_perfect_prefix_is_one() {
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10, 11], 2);
        let q = QualityMeasurer::default().measure(&fixture, 4).unwrap();
        assert!((q.ndcgs[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ndcg_discounts_late_hits() {
        let early = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10], 1);
        let late = single(Responses::Plain(vec![11, 12, 13, 10]), vec![10], 1);
        let measurer = QualityMeasurer::default();
        let early_ndcg = measurer.measure(&early, 4).unwrap().ndcgs[0];
        let late_ndcg = measurer.measure(&late, 4).unwrap().ndcgs[0];
        assert!((early_ndcg - 1.0).abs() < 1e-6);
        assert!(late_ndcg < early_ndcg);
        // Single relevant at 0-based position 3: log(2)/log(5).
        let expected = (std::f64::consts::LN_2 / 5.0_f64.ln()) as f32;
        assert!((late_ndcg - expected).abs() < 1e-6);
    }

    #[test]
    fn ndcg_is_zero_when_nothing_is_relevant_anywhere() {
        let fixture = single(Responses::Plain(vec![10, 11]), vec![], 0);
        let q = QualityMeasurer::default().measure(&fixture, 2).unwrap();
        assert_eq!(q.ndcgs[0], 0.0);
    }

    #[test]
    fn ns_is_nan_below_cutoff_four() {
        let fixture = single(Responses::Plain(vec![10, 11, 12]), vec![10], 1);
        let q = QualityMeasurer::default().measure(&fixture, 3).unwrap();
        assert!(q.ns_scores[0].is_nan());
    }

    #[test]
    fn positioned_responses_are_sorted_first() {
        let fixture = single(
            Responses::Positioned(vec![(2, 12), (0, 10), (1, 11), (3, 13)]),
            vec![10],
            1,
        );
        let q = QualityMeasurer::default().measure(&fixture, 4).unwrap();
        // 10 lands at position 0 after sorting.
        assert!((q.ndcgs[0] - 1.0).abs() < 1e-6);
    }

    // ─── Query ordering precondition ────────────────────────────────────

    #[test]
    fn out_of_order_query_ids_are_fatal() {
        let fixture = Fixture {
            queries: vec![
                (9, Responses::Plain(vec![1]), vec![], 1),
                (3, Responses::Plain(vec![1]), vec![], 1),
            ],
        };
        let err = QualityMeasurer::default().measure(&fixture, 1).unwrap_err();
        assert!(matches!(
            err,
            FuseError::QueryOrderViolation {
                index: 1,
                previous: 9,
                current: 3,
            }
        ));
    }

    #[test]
    fn equal_query_ids_are_allowed() {
        let fixture = Fixture {
            queries: vec![
                (5, Responses::Plain(vec![1]), vec![], 1),
                (5, Responses::Plain(vec![1]), vec![], 1),
            ],
        };
        assert!(QualityMeasurer::default().measure(&fixture, 1).is_ok());
    }

    // ─── Mean average precision ─────────────────────────────────────────

    #[test]
    fn map_perfect_rank_is_one() {
        // Both relevant items at the top: AP = 1.
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10, 11], 2);
        let map = QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .unwrap();
        assert!((map - 1.0).abs() < 1e-6);
    }

    #[test]
    fn map_trapezoid_areas() {
        // Relevant at ranks 0 and 2, 2 positives total.
        // Trapezoid 1: left 1, right 1/1, step 1/2 -> 0.5.
        // Trapezoid 2: left 1/2, right 2/3, step 1/2 -> 7/24.
        let fixture = single(Responses::Plain(vec![10, 11, 12, 13]), vec![10, 12], 2);
        let map = QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .unwrap();
        let expected = 0.5 + 7.0 / 24.0;
        assert!((map - expected).abs() < 1e-6);
    }

    #[test]
    fn map_skips_self_hits_with_position_shift() {
        // The query (id 1) appears at rank 0; relevant item at raw rank 1
        // becomes effective rank 0.
        let fixture = single(Responses::Plain(vec![1, 10, 11]), vec![10], 1);
        let map = QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .unwrap();
        assert!((map - 1.0).abs() < 1e-6);
    }

    #[test]
    fn map_positioned_responses_keep_stored_ranks() {
        // Sparse positioned list: the relevant item sits at stored rank 5,
        // not at the second dense slot. One trapezoid: left 0/5, right 1/6.
        let fixture = single(Responses::Positioned(vec![(0, 10), (5, 20)]), vec![20], 1);
        let map = QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .unwrap();
        assert!((map - 1.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn map_unavailable_on_rank_size_mismatch() {
        let fixture = Fixture {
            queries: vec![
                (1, Responses::Plain(vec![10, 11]), vec![10], 1),
                (2, Responses::Plain(vec![10, 11, 12]), vec![10], 1),
            ],
        };
        let measurer = QualityMeasurer::new(Some(2));
        assert_eq!(measurer.mean_average_precision(&fixture), None);
        // Other metrics are unaffected.
        let q = measurer.measure(&fixture, 2).unwrap();
        assert_eq!(q.map, None);
        assert!((q.precisions[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn map_without_expectation_accepts_mixed_sizes() {
        let fixture = Fixture {
            queries: vec![
                (1, Responses::Plain(vec![10, 11]), vec![10], 1),
                (2, Responses::Plain(vec![10, 11, 12]), vec![10], 1),
            ],
        };
        assert!(QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .is_some());
    }

    #[test]
    fn map_averages_over_all_queries_including_empty() {
        // One perfect query, one empty rank: (1 + 0) / 2.
        let fixture = Fixture {
            queries: vec![
                (1, Responses::Plain(vec![10]), vec![10], 1),
                (2, Responses::Plain(vec![]), vec![10], 1),
            ],
        };
        let map = QualityMeasurer::default()
            .mean_average_precision(&fixture)
            .unwrap();
        assert!((map - 0.5).abs() < 1e-6);
    }
}
