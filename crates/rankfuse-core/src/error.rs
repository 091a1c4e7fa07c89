use std::path::PathBuf;

/// Unified error type covering all failure modes across the rankfuse pipeline.
///
/// Fatal conditions (malformed input, precondition violations, unsupported
/// configurations) surface here and abort the run; recoverable conditions
/// (inconsistent rank sizes during MAP, partial incremental output) are
/// handled in place and only downgrade the affected output.
#[derive(Debug, thiserror::Error)]
pub enum FuseError {
    // === Input parsing ===
    /// A persisted rank, graph, or metrics file contains a line that does not
    /// match the expected format. Never skipped: a silently dropped entry
    /// would corrupt paired statistical comparisons downstream.
    #[error("malformed line {line} in {path}: {detail}")]
    MalformedLine {
        /// File being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What failed to parse.
        detail: String,
    },

    /// A file expected by the pipeline is structurally unusable (truncated
    /// header, wrong section count).
    #[error("corrupt file {path}: {detail}")]
    CorruptFile {
        /// Offending file.
        path: PathBuf,
        /// Nature of the corruption.
        detail: String,
    },

    // === Preconditions ===
    /// Queries must be supplied in non-decreasing id order so that repeated
    /// evaluation runs stay comparable in paired fashion.
    #[error(
        "query ids out of order at index {index}: {previous} precedes {current}; \
         supply queries sorted by id so evaluation runs can be compared in paired fashion"
    )]
    QueryOrderViolation {
        /// Index of the offending query.
        index: usize,
        /// Id seen immediately before.
        previous: u64,
        /// Offending id.
        current: u64,
    },

    /// A configuration value is invalid.
    #[error("invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: &'static str,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// A directory the pipeline requires does not exist or is a plain file.
    #[error("{path} must be an existing directory ({context})")]
    NotADirectory {
        /// Expected directory path.
        path: PathBuf,
        /// What the directory was needed for.
        context: &'static str,
    },

    // === Unsupported configurations ===
    /// The requested operation is not implemented for this configuration
    /// (e.g. a weight-dependent measure on an unweighted graph).
    #[error("{operation} is not implemented for this configuration: {reason}")]
    Unsupported {
        /// The operation requested.
        operation: &'static str,
        /// Why the configuration rules it out.
        reason: String,
    },

    // === I/O ===
    /// Wraps `std::io::Error` for file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the rankfuse crate hierarchy.
pub type FuseResult<T> = Result<T, FuseError>;
