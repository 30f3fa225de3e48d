#![warn(missing_docs)]
//! `ftl-lang` - data-driven FreeMarker (FTL) language tables for `ftl-editor-core`.
//!
//! This crate intentionally stays lightweight and does **not** depend on any lexing or
//! partitioning machinery. It provides the static facts the editing core needs in a
//! language-aware way: which directives exist and which of them open a block, the
//! special variables and built-ins offered by content assist, and the comment tokens.

mod builtins;
mod directives;

pub use builtins::{BUILTINS, EXPRESSION_KEYWORDS, SPECIAL_VARIABLES, is_expression_keyword};
pub use directives::{DIRECTIVES, DirectiveKind, DirectiveSpec, directive};

/// Two-character sequences that open a construct worth completing.
///
/// Typing the second character of one of these pairs auto-activates content assist.
pub const TRIGGER_SEQUENCES: &[&str] = &["<#", "<@", "</", "${", "#{"];

/// Returns `true` if `pair` (the two characters before the caret) is a trigger sequence.
pub fn is_trigger_sequence(pair: &str) -> bool {
    TRIGGER_SEQUENCES.contains(&pair)
}

/// Comment tokens/config for a template language.
///
/// The editing core uses this to recognize comment partitions and to auto-close them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentConfig {
    /// Line comment token, if the language has one. FTL does not.
    pub line: Option<String>,
    /// Block comment start token (e.g. `<#--`).
    pub block_start: Option<String>,
    /// Block comment end token (e.g. `-->`).
    pub block_end: Option<String>,
}

impl CommentConfig {
    /// Create a config that supports only block comments.
    pub fn block(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            line: None,
            block_start: Some(start.into()),
            block_end: Some(end.into()),
        }
    }

    /// FreeMarker's `<#-- ... -->` comment.
    pub fn ftl() -> Self {
        Self::block("<#--", "-->")
    }

    /// Returns `true` if a line comment token is configured.
    pub fn has_line(&self) -> bool {
        self.line.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Returns `true` if both block comment tokens are configured.
    pub fn has_block(&self) -> bool {
        self.block_start.as_deref().is_some_and(|s| !s.is_empty())
            && self.block_end.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Returns `true` if `c` may appear in a directive or macro name.
///
/// Macro names may be namespaced (`<@layout.page>`), so `.` is accepted as well.
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '$')
}

/// Returns `true` if `c` may start an expression identifier.
pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '_' | '$' | '@')
}

/// Returns `true` if `c` may continue an expression identifier.
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '@')
}
