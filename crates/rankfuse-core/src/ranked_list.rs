//! Bounded best-K ranked lists with a two-phase accumulate/freeze lifecycle.
//!
//! [`RankedListBuilder`] is the accumulation phase: concurrent `add` calls
//! insert into a bounded best-K heap, evicting the worst-ranked entry when
//! capacity is exceeded. [`RankedListBuilder::materialize`] consumes the
//! builder by value into a [`RankedList`], whose length and order never
//! change afterwards — adding to a frozen list is a compile error, not a
//! runtime hazard.
//!
//! Persistence is one line per entry, best first: `"<score>\t<id>"`, or a
//! bare `"<id>"` when the list carries no scores. Loading auto-detects the
//! weighted form from the first line (see [`RankedList::load`]).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{FuseError, FuseResult};
use crate::format::format_score;
use crate::normalize;

/// Opaque item identifier, stable across a run and unique per item.
pub type ItemId = u64;

/// One ranked entry: an item and its score.
///
/// Whether a higher or lower score is better is a property of the list the
/// entry belongs to, not of the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankEntry {
    pub id: ItemId,
    pub score: f32,
}

// Heap slot ordered so that `BinaryHeap::peek` yields the worst kept entry.
#[derive(Debug, Clone, Copy)]
struct Slot {
    goodness: f32,
    id: ItemId,
    score: f32,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the heap's maximum is the lowest-goodness slot.
        other
            .goodness
            .total_cmp(&self.goodness)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Accumulation phase of a bounded ranked list.
///
/// `add` is thread-safe; callers never coordinate locking themselves.
/// Capacity `None` means unbounded; `Some(0)` yields an always-empty list.
#[derive(Debug)]
pub struct RankedListBuilder {
    capacity: Option<usize>,
    higher_is_better: bool,
    heap: Mutex<BinaryHeap<Slot>>,
}

impl RankedListBuilder {
    #[must_use]
    pub fn new(capacity: Option<usize>, higher_is_better: bool) -> Self {
        let heap = match capacity {
            Some(k) => BinaryHeap::with_capacity(k.saturating_add(1)),
            None => BinaryHeap::new(),
        };
        Self {
            capacity,
            higher_is_better,
            heap: Mutex::new(heap),
        }
    }

    /// Whether this list ranks higher scores as better.
    #[must_use]
    pub const fn higher_is_better(&self) -> bool {
        self.higher_is_better
    }

    /// Insert `(id, score)`, evicting the worst-ranked entry when the
    /// configured capacity is exceeded. No tie-break order is guaranteed
    /// among equal scores.
    pub fn add(&self, id: ItemId, score: f32) {
        if self.capacity == Some(0) {
            return;
        }
        let goodness = if self.higher_is_better { score } else { -score };
        let slot = Slot {
            goodness,
            id,
            score,
        };
        let mut heap = self.heap.lock().expect("ranked-list heap poisoned");
        match self.capacity {
            None => heap.push(slot),
            Some(k) => {
                if heap.len() < k {
                    heap.push(slot);
                } else if heap
                    .peek()
                    .is_some_and(|worst| goodness > worst.goodness)
                {
                    heap.pop();
                    heap.push(slot);
                }
            }
        }
    }

    /// Freeze the accumulated entries into an ordered list, best first.
    ///
    /// Consumes the builder: the frozen list cannot be added to.
    #[must_use]
    pub fn materialize(self) -> RankedList {
        let heap = self.heap.into_inner().expect("ranked-list heap poisoned");
        let mut slots = heap.into_vec();
        slots.sort_unstable_by(|a, b| {
            b.goodness
                .total_cmp(&a.goodness)
                .then_with(|| a.id.cmp(&b.id))
        });
        let entries = slots
            .into_iter()
            .map(|slot| RankEntry {
                id: slot.id,
                score: slot.score,
            })
            .collect();
        RankedList {
            entries,
            weighted: true,
        }
    }
}

/// Materialized phase of a ranked list: fixed length, fixed order, best
/// first. Scores may still be rescaled in place; the sequence never grows,
/// shrinks (except by explicit [`RankedList::truncate`]), or reorders.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    entries: Vec<RankEntry>,
    weighted: bool,
}

impl RankedList {
    /// Build directly from already-ordered entries (best first).
    #[must_use]
    pub fn from_entries(entries: Vec<RankEntry>, weighted: bool) -> Self {
        Self { entries, weighted }
    }

    /// Build an unweighted list from ordered ids.
    #[must_use]
    pub fn from_ids(ids: Vec<ItemId>) -> Self {
        let entries = ids
            .into_iter()
            .map(|id| RankEntry { id, score: 0.0 })
            .collect();
        Self {
            entries,
            weighted: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether scores are meaningful (false for bare-id lists).
    #[must_use]
    pub const fn is_weighted(&self) -> bool {
        self.weighted
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&RankEntry> {
        self.entries.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankEntry> {
        self.entries.iter()
    }

    /// Item ids in rank order, best first.
    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Linear scan for `id`: `(0-based position, score)`, or `None` when the
    /// item is not in the list.
    #[must_use]
    pub fn position_and_score_of(&self, id: ItemId) -> Option<(usize, f32)> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .map(|position| (position, self.entries[position].score))
    }

    /// Affine-rescale all scores into `[min, max]`; all-equal scores map to
    /// `max`. No-op on unweighted lists, whose scores carry no meaning.
    pub fn normalize(&mut self, min: f32, max: f32) {
        if !self.weighted {
            return;
        }
        let mut scores: Vec<f32> = self.entries.iter().map(|entry| entry.score).collect();
        normalize::rescale(&mut scores, min, max);
        for (entry, score) in self.entries.iter_mut().zip(scores) {
            entry.score = score;
        }
    }

    /// Like [`RankedList::normalize`], but first inverts scores as
    /// `max_of_sequence - score` when the sequence is not already
    /// non-increasing, so the normalized list always decreases from best to
    /// worst.
    pub fn normalize_decreasing(&mut self, min: f32, max: f32) {
        if !self.weighted {
            return;
        }
        if !self.is_non_increasing() {
            let max_score = self
                .entries
                .iter()
                .map(|entry| entry.score)
                .fold(f32::NEG_INFINITY, f32::max);
            for entry in &mut self.entries {
                entry.score = max_score - entry.score;
            }
        }
        self.normalize(min, max);
    }

    /// Overwrite scores by linear interpolation from `first` to `last`
    /// across positions, ignoring the original scores. Converts an ordinal
    /// rank into comparable scores; the list becomes weighted.
    pub fn assign_uniform_interval(&mut self, first: f32, last: f32) {
        let n = self.entries.len();
        if n == 0 {
            return;
        }
        if n == 1 {
            self.entries[0].score = first;
        } else {
            let step = (last - first) / (n as f32 - 1.0);
            for (position, entry) in self.entries.iter_mut().enumerate() {
                entry.score = first + position as f32 * step;
            }
        }
        self.weighted = true;
    }

    /// Keep only the first `k` entries.
    pub fn truncate(&mut self, k: usize) {
        self.entries.truncate(k);
    }

    fn is_non_increasing(&self) -> bool {
        self.entries
            .windows(2)
            .all(|window| window[1].score <= window[0].score)
    }

    // ─── Persistence ────────────────────────────────────────────────────

    /// Path of the per-query rank file for `id` under `dir`.
    #[must_use]
    pub fn file_for(dir: &Path, id: ItemId) -> PathBuf {
        dir.join(id.to_string())
    }

    /// Write the list best-first: `"<score>\t<id>"` per line, or bare
    /// `"<id>"` when unweighted.
    pub fn save(&self, path: &Path) -> FuseResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            if self.weighted {
                writeln!(out, "{}\t{}", format_score(f64::from(entry.score)), entry.id)?;
            } else {
                writeln!(out, "{}", entry.id)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// [`RankedList::save`] into the file named after `id` under `dir`.
    pub fn save_to_dir(&self, id: ItemId, dir: &Path) -> FuseResult<()> {
        self.save(&Self::file_for(dir, id))
    }

    /// Load up to `limit` entries (`None` = all), best first.
    ///
    /// The weighted form is auto-detected from the first line: with two
    /// tokens present, the token containing a decimal point is taken as the
    /// score. This is a content heuristic kept for compatibility with
    /// existing rank directories, not a guaranteed format marker. Any
    /// malformed line fails the whole load.
    pub fn load(path: &Path, limit: Option<usize>) -> FuseResult<Self> {
        let mut entries = Vec::new();
        let mut weighted = false;
        Self::load_each(path, limit, |_, id, score| {
            if let Some(score) = score {
                weighted = true;
                entries.push(RankEntry { id, score });
            } else {
                entries.push(RankEntry { id, score: 0.0 });
            }
        })?;
        Ok(Self { entries, weighted })
    }

    /// [`RankedList::load`] from the file named after `id` under `dir`.
    pub fn load_from_dir(dir: &Path, id: ItemId, limit: Option<usize>) -> FuseResult<Self> {
        Self::load(&Self::file_for(dir, id), limit)
    }

    /// Load only the ids, in rank order.
    pub fn load_ids(path: &Path, limit: Option<usize>) -> FuseResult<Vec<ItemId>> {
        let mut ids = Vec::new();
        Self::load_each(path, limit, |_, id, _| ids.push(id))?;
        Ok(ids)
    }

    /// Streaming load: `consumer(position, id, score)` per entry.
    pub fn load_each(
        path: &Path,
        limit: Option<usize>,
        mut consumer: impl FnMut(usize, ItemId, Option<f32>),
    ) -> FuseResult<()> {
        if limit == Some(0) {
            return Ok(());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut layout: Option<LineLayout> = None;
        let mut consumed = 0_usize;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let layout = *layout.get_or_insert_with(|| LineLayout::detect(&tokens));
            let (id, score) = layout
                .parse(&tokens)
                .map_err(|detail| FuseError::MalformedLine {
                    path: path.to_path_buf(),
                    line: index + 1,
                    detail,
                })?;
            consumer(consumed, id, score);
            consumed += 1;
            if limit.is_some_and(|limit| consumed >= limit) {
                break;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a RankEntry;
    type IntoIter = std::slice::Iter<'a, RankEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Token layout of a rank file, fixed by its first line.
#[derive(Debug, Clone, Copy)]
enum LineLayout {
    BareId,
    /// `(score_index, id_index)` within the whitespace-split tokens.
    Pair(usize, usize),
}

impl LineLayout {
    fn detect(tokens: &[&str]) -> Self {
        if tokens.len() < 2 {
            return Self::BareId;
        }
        // Score-first is the native layout; a decimal point in the second
        // token signals an id-first file from an external producer.
        if tokens[1].contains('.') {
            Self::Pair(1, 0)
        } else {
            Self::Pair(0, 1)
        }
    }

    fn parse(self, tokens: &[&str]) -> Result<(ItemId, Option<f32>), String> {
        match self {
            Self::BareId => {
                let raw = tokens
                    .first()
                    .ok_or_else(|| "empty line in rank file".to_string())?;
                let id = raw
                    .parse::<ItemId>()
                    .map_err(|e| format!("unparsable id {raw:?}: {e}"))?;
                Ok((id, None))
            }
            Self::Pair(score_index, id_index) => {
                if tokens.len() < 2 {
                    return Err(format!(
                        "expected \"<score>\\t<id>\" but found {} token(s)",
                        tokens.len()
                    ));
                }
                let score = tokens[score_index]
                    .parse::<f32>()
                    .map_err(|e| format!("unparsable score {:?}: {e}", tokens[score_index]))?;
                let id = tokens[id_index]
                    .parse::<ItemId>()
                    .map_err(|e| format!("unparsable id {:?}: {e}", tokens[id_index]))?;
                Ok((id, Some(score)))
            }
        }
    }
}
