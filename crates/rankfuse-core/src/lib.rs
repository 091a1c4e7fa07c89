//! Core types for the rankfuse rank-aggregation engine.
//!
//! This crate defines the bounded ranked-list structure every other rankfuse
//! crate builds on ([`RankedListBuilder`]/[`RankedList`]), the unified error
//! type ([`FuseError`]), score normalization, fixed-decimal formatting for
//! the line-based file formats, the narrow storage contract
//! ([`SampleStore`]), and optional tracing setup.
//!
//! It has minimal external dependencies and is intended to be depended on by
//! every other crate in the workspace.

pub mod error;
pub mod format;
pub mod normalize;
pub mod ranked_list;
pub mod store;
pub mod tracing_config;

pub use error::{FuseError, FuseResult};
pub use format::{SCORE_DIGITS, WEIGHT_DIGITS, format_fixed, format_score, format_weight};
pub use ranked_list::{ItemId, RankEntry, RankedList, RankedListBuilder};
pub use store::{FlatStore, SampleStore, needs_compute};
