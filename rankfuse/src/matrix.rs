//! Rank generation from a precomputed distance/similarity matrix directory.
//!
//! The matrix is stored as one file per item id, each line holding
//! `"<otherId> <value>"`. Each unordered pair is recorded exactly once, with
//! no guarantee of which side holds it, so consumers symmetrize; `d(A, A)`
//! entries are never present.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use rankfuse_core::{FlatStore, FuseError, FuseResult, ItemId, RankedListBuilder, SampleStore};

/// Visit every matrix entry under `dir` as `(idA, idB, value)`.
///
/// Each unordered pair is delivered once; callers must symmetrize.
pub fn for_each_entry(
    dir: &Path,
    mut consumer: impl FnMut(ItemId, ItemId, f32),
) -> FuseResult<()> {
    let store = FlatStore::new(dir);
    for path in store.list_files()? {
        let row_id: ItemId = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse().ok())
            .ok_or_else(|| FuseError::CorruptFile {
                path: path.clone(),
                detail: "matrix file name is not an item id".into(),
            })?;
        let reader = BufReader::new(File::open(&path)?);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let entry = (|| -> Option<(ItemId, f32)> {
                let id = tokens.next()?.parse().ok()?;
                let value = tokens.next()?.parse().ok()?;
                Some((id, value))
            })();
            let Some((column_id, value)) = entry else {
                return Err(FuseError::MalformedLine {
                    path: path.clone(),
                    line: index + 1,
                    detail: format!("expected \"<otherId> <value>\", got {line:?}"),
                });
            };
            consumer(row_id, column_id, value);
        }
    }
    Ok(())
}

/// How matrix values turn into bounded ranks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRankConfig {
    /// Whether values are similarities (higher is better) or distances.
    pub similarities: bool,
    /// Rank capacity; `None` keeps everything.
    pub rank_size: Option<usize>,
    /// When set, ranks are normalized decreasing into this interval before
    /// being persisted.
    pub normalize: Option<(f32, f32)>,
}

/// Build one bounded rank per matrix row and persist each to `output_dir`.
///
/// Every list starts with a self-entry scored `1` for similarities and `0`
/// for distances. `row_filter` restricts which ids get a rank; `column_filter`
/// restricts which ids may appear as responses. Returns the number of ranks
/// written.
#[instrument(
    name = "rankfuse::rank_generate",
    target = "rankfuse.matrix",
    skip_all,
    fields(similarities = config.similarities)
)]
pub fn generate_from_matrix(
    matrix_dir: &Path,
    output_dir: &Path,
    config: &MatrixRankConfig,
    row_filter: Option<&HashSet<ItemId>>,
    column_filter: Option<&HashSet<ItemId>>,
) -> FuseResult<usize> {
    let metric_to_itself = if config.similarities { 1.0 } else { 0.0 };
    let allows = |filter: Option<&HashSet<ItemId>>, id: ItemId| {
        filter.map_or(true, |allowed| allowed.contains(&id))
    };

    let mut builders: HashMap<ItemId, RankedListBuilder> = HashMap::new();
    for_each_entry(matrix_dir, |id_a, id_b, value| {
        for (query, response) in [(id_a, id_b), (id_b, id_a)] {
            if !allows(row_filter, query) || !allows(column_filter, response) {
                continue;
            }
            let builder = builders.entry(query).or_insert_with(|| {
                let builder = RankedListBuilder::new(config.rank_size, config.similarities);
                builder.add(query, metric_to_itself);
                builder
            });
            builder.add(response, value);
        }
    })?;

    let mut count = 0;
    for (id, builder) in builders {
        let mut rank = builder.materialize();
        if let Some((min, max)) = config.normalize {
            rank.normalize_decreasing(min, max);
        }
        rank.save_to_dir(id, output_dir)?;
        count += 1;
    }
    info!(
        target: "rankfuse.matrix",
        ranks = count,
        output = %output_dir.display(),
        "matrix-based ranks generated"
    );
    Ok(count)
}
