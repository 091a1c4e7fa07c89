//! Optional tracing subscriber setup for rankfuse.
//!
//! Convenience for consumers who want structured logging without configuring
//! `tracing-subscriber` themselves. Entirely optional: consumers may bring
//! their own subscriber.
//!
//! # Usage
//!
//! ```ignore
//! use rankfuse_core::tracing_config::init_tracing;
//! use tracing::Level;
//!
//! init_tracing(Level::INFO);
//! // All rankfuse spans and events are now captured.
//! ```

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Target prefix used by all rankfuse tracing spans and events.
///
/// Consumers can use this to filter rankfuse logs:
/// ```text
/// RUST_LOG=rankfuse=debug
/// ```
pub const TARGET_PREFIX: &str = "rankfuse";

/// Standard tracing span names used across the pipeline.
///
/// Constant span names let consumers match on them in subscribers and tests.
pub mod span_names {
    /// Self-pairwise or cross-set rank generation.
    pub const RANK_GENERATE: &str = "rankfuse::rank_generate";
    /// Rank loading from a per-descriptor directory.
    pub const RANK_LOAD: &str = "rankfuse::rank_load";
    /// Mutual-neighbor reranking.
    pub const RERANK: &str = "rankfuse::rerank";
    /// Per-query fusion-graph construction.
    pub const FUSION_GRAPH: &str = "rankfuse::fusion_graph";
    /// Graph-similarity final ranking.
    pub const GRAPH_RANK: &str = "rankfuse::graph_rank";
    /// Retrieval-quality measurement.
    pub const EVALUATE: &str = "rankfuse::evaluate";
}

/// Parse a log level string (case-insensitive).
///
/// Recognized values: `trace`, `debug`, `info`, `warn`, `error`.
/// Returns `None` for unrecognized strings.
#[must_use]
pub fn parse_level(raw: &str) -> Option<Level> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install a global fmt subscriber filtered to rankfuse targets at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Returns `false` when
/// a global subscriber was already installed (the call is then a no-op, which
/// is fine in tests that race to initialize).
pub fn init_tracing(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{TARGET_PREFIX}={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
