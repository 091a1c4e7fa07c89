//! Retrieval-quality measurement for rankfuse.
//!
//! Scores ranked lists against ground-truth relevance: per-query precision,
//! recall, average precision, NDCG, and N-S at a cutoff, plus corpus-level
//! mean average precision over uncut ranks. Results aggregate into
//! [`QualityQueries`], which serializes to the fixed CSV metrics format.

pub mod measurer;
pub mod quality;
pub mod relevance;

pub use measurer::{QualityMeasurer, QuerySet, Responses};
pub use quality::QualityQueries;
pub use relevance::{LabelIndex, LabeledQuerySet};
