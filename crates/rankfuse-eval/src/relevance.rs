//! Ground-truth relevance from class labels.
//!
//! [`LabelIndex`] is built once from `(item, label)` pairs and never mutated:
//! a response is relevant to a query when both carry the same label.

use std::collections::HashMap;

use rankfuse_core::ItemId;

use crate::measurer::{QuerySet, Responses};

/// Immutable item-to-label mapping with per-label counts.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    label_of: HashMap<ItemId, String>,
    counts: HashMap<String, usize>,
}

impl LabelIndex {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ItemId, String)>) -> Self {
        let mut label_of = HashMap::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (id, label) in pairs {
            *counts.entry(label.clone()).or_default() += 1;
            label_of.insert(id, label);
        }
        Self { label_of, counts }
    }

    #[must_use]
    pub fn label_of(&self, id: ItemId) -> Option<&str> {
        self.label_of.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn count_for_label(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn num_items(&self) -> usize {
        self.label_of.len()
    }

    /// Whether `response` shares `query`'s label. Unlabeled items are never
    /// relevant.
    #[must_use]
    pub fn is_relevant(&self, query: ItemId, response: ItemId) -> bool {
        match (self.label_of(query), self.label_of(response)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Number of truly relevant items for `query` in the corpus, excluding
    /// the query itself.
    #[must_use]
    pub fn max_relevant_for(&self, query: ItemId) -> usize {
        self.label_of(query)
            .map_or(0, |label| self.count_for_label(label).saturating_sub(1))
    }
}

/// [`QuerySet`] over in-memory ranks with a shared [`LabelIndex`] as the
/// relevance oracle. Queries must already be sorted by id.
#[derive(Debug)]
pub struct LabeledQuerySet<'a> {
    queries: Vec<(ItemId, Vec<ItemId>)>,
    labels: &'a LabelIndex,
}

impl<'a> LabeledQuerySet<'a> {
    #[must_use]
    pub fn new(queries: Vec<(ItemId, Vec<ItemId>)>, labels: &'a LabelIndex) -> Self {
        Self { queries, labels }
    }
}

impl QuerySet for LabeledQuerySet<'_> {
    fn len(&self) -> usize {
        self.queries.len()
    }

    fn query_id(&self, index: usize) -> ItemId {
        self.queries[index].0
    }

    fn responses(&self, index: usize) -> Responses {
        Responses::Plain(self.queries[index].1.clone())
    }

    fn is_relevant(&self, index: usize, response: ItemId) -> bool {
        self.labels.is_relevant(self.queries[index].0, response)
    }

    fn max_relevant(&self, index: usize) -> usize {
        self.labels.max_relevant_for(self.queries[index].0)
    }
}
