//! Loading persisted ranks for fusion, with optional mutual-neighbor
//! reranking, plus the single-file rank exchange format.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use rankfuse_core::{
    FlatStore, FuseError, FuseResult, ItemId, RankEntry, RankedList, SampleStore,
};

/// Mutual-neighbor rerank applied while loading a rank directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    /// Keep the raw ranks.
    #[default]
    None,
    /// New score `fwd + back`.
    Simple,
    /// New score `fwd + back + max(fwd, back)`.
    Reciprocal,
}

impl RerankMode {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }

    fn rescore(self, forward: usize, backward: usize) -> f32 {
        let base = (forward + backward) as f32;
        match self {
            Self::None => base,
            Self::Simple => base,
            Self::Reciprocal => base + forward.max(backward) as f32,
        }
    }
}

/// Load one ranked-list file per query id from `dir`.
///
/// Files are named by query id. Without reranking, each file is read up to
/// `rank_size` entries. With reranking, `rerank_load_size` entries are read
/// per file, rescored against the mutual ranks, and the result truncated to
/// `rank_size`.
#[instrument(
    name = "rankfuse::rank_load",
    target = "rankfuse.loader",
    skip_all,
    fields(dir = %dir.display(), rerank = ?rerank)
)]
pub fn load_rank_dir(
    dir: &Path,
    rank_size: Option<usize>,
    rerank: RerankMode,
    rerank_load_size: Option<usize>,
) -> FuseResult<BTreeMap<ItemId, RankedList>> {
    let store = FlatStore::new(dir);
    let files = store.list_files()?;

    if !rerank.is_enabled() {
        let mut ranks = BTreeMap::new();
        for path in &files {
            let id = id_from_file_name(path)?;
            ranks.insert(id, RankedList::load(path, rank_size)?);
        }
        debug!(target: "rankfuse.loader", ranks = ranks.len(), "ranks loaded");
        return Ok(ranks);
    }

    // Raw ranks in file order, with a position lookup for the reverse hops.
    struct RawRank {
        order: Vec<ItemId>,
        positions: HashMap<ItemId, usize>,
    }
    let mut raw: BTreeMap<ItemId, RawRank> = BTreeMap::new();
    for path in &files {
        let id = id_from_file_name(path)?;
        let mut order = Vec::new();
        let mut positions = HashMap::new();
        RankedList::load_each(path, rerank_load_size, |position, entry_id, _| {
            order.push(entry_id);
            positions.insert(entry_id, position);
        })?;
        raw.insert(id, RawRank { order, positions });
    }

    let mut ranks = BTreeMap::new();
    for (&query_id, rank) in &raw {
        let mut rescored: Vec<RankEntry> = Vec::with_capacity(rank.order.len());
        for (index, &neighbor) in rank.order.iter().enumerate() {
            let forward = index + 1;
            let reverse = raw.get(&neighbor).ok_or_else(|| FuseError::CorruptFile {
                path: dir.to_path_buf(),
                detail: format!(
                    "rank of item {neighbor} (referenced by {query_id}) is missing; \
                     reranking needs every ranked item's own rank"
                ),
            })?;
            let backward = reverse
                .positions
                .get(&query_id)
                .map_or(reverse.order.len() + 1, |&position| position + 1);
            rescored.push(RankEntry {
                id: neighbor,
                score: rerank.rescore(forward, backward),
            });
        }
        // Lower is better here; the stable sort keeps the original rank
        // order among ties.
        rescored.sort_by(|a, b| a.score.total_cmp(&b.score));
        if let Some(k) = rank_size {
            rescored.truncate(k);
        }
        ranks.insert(query_id, RankedList::from_entries(rescored, true));
    }
    info!(
        target: "rankfuse.loader",
        ranks = ranks.len(),
        rerank = ?rerank,
        "ranks loaded and reranked"
    );
    Ok(ranks)
}

/// Load the per-descriptor ranks that feed fusion-graph construction.
///
/// Each descriptor directory is loaded (optionally reranked), then every
/// rank's scores are mapped into `[0.1, 1]` so no vertex or edge contributes
/// zero weight: linearly by position when `normalize_linear`, otherwise by
/// decreasing score normalization.
pub fn load_ranks_for_aggregation(
    descriptor_dirs: &[&Path],
    rank_size: Option<usize>,
    rerank: RerankMode,
    rerank_load_size: Option<usize>,
    normalize_linear: bool,
) -> FuseResult<HashMap<ItemId, Vec<RankedList>>> {
    const NORM_MIN: f32 = 0.1;
    const NORM_MAX: f32 = 1.0;

    let mut ranks_by_id: HashMap<ItemId, Vec<RankedList>> = HashMap::new();
    for dir in descriptor_dirs {
        let ranks = load_rank_dir(dir, rank_size, rerank, rerank_load_size)?;
        for (id, mut rank) in ranks {
            if normalize_linear {
                rank.assign_uniform_interval(NORM_MAX, NORM_MIN);
            } else {
                rank.normalize_decreasing(NORM_MIN, NORM_MAX);
            }
            ranks_by_id.entry(id).or_default().push(rank);
        }
    }
    Ok(ranks_by_id)
}

// ─── Single-file exchange format ────────────────────────────────────────

/// Write all ranks into one file, one line per query: the query id followed
/// by its response ids, space-separated. A leading self-entry in the rank is
/// skipped, since the line already starts with the query id.
pub fn write_ranks_file(ranks: &BTreeMap<ItemId, Vec<ItemId>>, path: &Path) -> FuseResult<()> {
    let mut out = Vec::new();
    for (query_id, rank) in ranks {
        let offset = usize::from(rank.first() == Some(query_id));
        write!(out, "{query_id}")?;
        for id in &rank[offset..] {
            write!(out, " {id}")?;
        }
        writeln!(out)?;
    }
    fs::write(path, out)?;
    info!(
        target: "rankfuse.loader",
        ranks = ranks.len(),
        path = %path.display(),
        "ranks written to single file"
    );
    Ok(())
}

/// Load a single-file rank set written by [`write_ranks_file`] (or an
/// external producer with a different `separator`).
///
/// Each line is split by `separator`; `offset` tokens are skipped, then up
/// to `max_rank_size` ids are taken (`None` = all). The first taken id keys
/// the map.
pub fn load_ranks_file(
    path: &Path,
    max_rank_size: Option<usize>,
    separator: &str,
    offset: usize,
) -> FuseResult<BTreeMap<ItemId, Vec<ItemId>>> {
    let text = fs::read_to_string(path)?;
    let mut ranks = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split(separator).collect();
        let end = max_rank_size.map_or(tokens.len(), |k| (offset + k).min(tokens.len()));
        if offset >= end {
            return Err(FuseError::MalformedLine {
                path: path.to_path_buf(),
                line: index + 1,
                detail: format!("no rank entries after offset {offset}"),
            });
        }
        let rank = tokens[offset..end]
            .iter()
            .map(|token| {
                token.parse::<ItemId>().map_err(|_| FuseError::MalformedLine {
                    path: path.to_path_buf(),
                    line: index + 1,
                    detail: format!("unparsable id {token:?}"),
                })
            })
            .collect::<FuseResult<Vec<ItemId>>>()?;
        ranks.insert(rank[0], rank);
    }
    Ok(ranks)
}

fn id_from_file_name(path: &Path) -> FuseResult<ItemId> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
        .ok_or_else(|| FuseError::CorruptFile {
            path: path.to_path_buf(),
            detail: "rank file name is not an item id".into(),
        })
}
