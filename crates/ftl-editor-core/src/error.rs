//! Engine error type.
//!
//! Only programming-contract violations surface as errors. Malformed template input
//! (unterminated tags, unknown characters, unresolvable includes) degrades silently and
//! never produces an [`EngineError`].

use thiserror::Error;

/// Errors produced by `ftl-editor-core`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An edit notification addressed text outside the document.
    #[error("edit out of bounds: offset {offset} removing {removed} chars (document length: {len})")]
    EditOutOfBounds {
        /// Edit start offset (chars).
        offset: usize,
        /// Number of chars the edit removes.
        removed: usize,
        /// Document length before the edit.
        len: usize,
    },

    /// A damage region does not fit the document or the partition list it was paired with.
    #[error(
        "damage region out of bounds: offset {offset}, original length {original_length}, new length {new_length} (document length: {len})"
    )]
    DamageOutOfBounds {
        /// Damage start offset.
        offset: usize,
        /// Length of the replaced text.
        original_length: usize,
        /// Length of the inserted text.
        new_length: usize,
        /// Length of the edited document.
        len: usize,
    },

    /// A partition list failed the tiling check.
    #[error("partition list does not tile the document at index {index}: {detail}")]
    BrokenTiling {
        /// Index of the first offending partition.
        index: usize,
        /// Human readable description.
        detail: String,
    },

    /// Configuration could not be parsed.
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
