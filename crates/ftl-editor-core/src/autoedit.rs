//! Auto-edit strategies.
//!
//! Each keystroke becomes a [`DocumentCommand`] before it reaches the document. The strategies
//! registered for the partition type at the caret may rewrite it:
//!
//! - **Insert a closer**: `<` then `#` gives `<#|>`; `$` then `{` gives `${|}`; `<#-` then `-`
//!   gives `<#-- | -->`.
//! - **Skip a closer**: typing `>` in front of the tag's own `>`, or `}` in front of the
//!   interpolation's own `}`, just moves the caret past it.
//! - **Indent**: a newline copies the leading white-space of the current line.
//!
//! Strategies run in order and the first one that changes the command wins. [`AutoIndent`]
//! is always last and only reacts to newlines, so it never competes with the others.
//!
//! [`AutoIndent`]: AutoEditStrategy::AutoIndent

use crate::delta::DocumentEdit;
use crate::partition::{Partition, PartitionType, partition_at};
use regex::Regex;
use ropey::Rope;
use std::sync::LazyLock;

/// One auto-edit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoEditStrategy {
    /// `<` + `#`/`@` inserts the closing `>`.
    TagCloser,
    /// `$`/`#` + `{` inserts the closing `}`.
    InterpolationCloser,
    /// `>` in front of the tag's closing `>` is consumed.
    TagDoubleClosingPrevention,
    /// `<#-` + `-` completes the comment to `<#-- | -->`.
    CommentCloser,
    /// `}` in front of the interpolation's closing `}` is consumed.
    InterpolationDoubleClosingPrevention,
    /// A newline keeps the indentation of the current line.
    AutoIndent,
}

const TEXT_STRATEGIES: &[AutoEditStrategy] = &[
    AutoEditStrategy::TagCloser,
    AutoEditStrategy::InterpolationCloser,
    AutoEditStrategy::AutoIndent,
];
const TAG_STRATEGIES: &[AutoEditStrategy] = &[
    AutoEditStrategy::TagDoubleClosingPrevention,
    AutoEditStrategy::CommentCloser,
    AutoEditStrategy::AutoIndent,
];
const INTERPOLATION_STRATEGIES: &[AutoEditStrategy] = &[
    AutoEditStrategy::InterpolationDoubleClosingPrevention,
    AutoEditStrategy::AutoIndent,
];
const INDENT_ONLY: &[AutoEditStrategy] = &[AutoEditStrategy::AutoIndent];

/// Strategies for a partition type, in the order they are tried.
///
/// With `auto_closers_enabled` off only [`AutoEditStrategy::AutoIndent`] remains.
pub fn strategies_for(
    partition_type: PartitionType,
    auto_closers_enabled: bool,
) -> &'static [AutoEditStrategy] {
    if !auto_closers_enabled {
        return INDENT_ONLY;
    }
    match partition_type {
        PartitionType::Text => TEXT_STRATEGIES,
        PartitionType::DirectiveStart
        | PartitionType::DirectiveEnd
        | PartitionType::MacroInstanceStart
        | PartitionType::MacroInstanceEnd => TAG_STRATEGIES,
        PartitionType::DollarInterpolation | PartitionType::HashInterpolation => {
            INTERPOLATION_STRATEGIES
        }
        PartitionType::Comment => INDENT_ONLY,
    }
}

/// A pending text replacement plus where the caret should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCommand {
    /// Start of the replaced range.
    pub offset: usize,
    /// Length of the replaced range.
    pub length: usize,
    /// Replacement text.
    pub text: String,
    /// Caret after the command, if not at the end of the inserted text.
    pub caret: Option<usize>,
}

impl DocumentCommand {
    /// A command replacing `length` chars at `offset` with `text`.
    pub fn new(offset: usize, length: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            text: text.into(),
            caret: None,
        }
    }

    /// Caret position once the command is applied.
    pub fn caret_offset(&self) -> usize {
        self.caret
            .unwrap_or(self.offset + self.text.chars().count())
    }

    /// The edit this command performs.
    pub fn to_edit(&self) -> DocumentEdit {
        DocumentEdit::new(self.offset, self.length, self.text.clone())
    }

    /// The single typed character, if this is a plain keystroke.
    fn typed(&self) -> Option<char> {
        let mut chars = self.text.chars();
        match (self.length, chars.next(), chars.next()) {
            (0, Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Partition whose strategies apply to a keystroke at `offset`: the one holding the character
/// before the caret.
pub fn partition_at_caret(partitions: &[Partition], offset: usize) -> Option<&Partition> {
    partition_at(partitions, offset.saturating_sub(1))
}

/// Run `strategies` over `command` and return the one that changed it.
///
/// `text` is the document before the command; `partition` the partition at the caret.
pub fn customize_command(
    strategies: &[AutoEditStrategy],
    text: &Rope,
    partition: &Partition,
    command: &mut DocumentCommand,
) -> Option<AutoEditStrategy> {
    strategies
        .iter()
        .copied()
        .find(|strategy| strategy.customize(text, partition, command))
}

static LEADING_WHITESPACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[ \t]*").ok());

impl AutoEditStrategy {
    /// Apply this strategy to `command`. Returns `true` if the command changed.
    pub fn customize(
        self,
        text: &Rope,
        partition: &Partition,
        command: &mut DocumentCommand,
    ) -> bool {
        let offset = command.offset;
        if offset > text.len_chars() {
            return false;
        }
        let before = |n: usize| -> Option<char> {
            offset.checked_sub(n).and_then(|i| text.get_char(i))
        };
        let after = text.get_char(offset);

        match self {
            AutoEditStrategy::TagCloser => {
                let Some(typed @ ('#' | '@')) = command.typed() else {
                    return false;
                };
                let opens_tag =
                    before(1) == Some('<') || (before(1) == Some('/') && before(2) == Some('<'));
                if !opens_tag || after == Some('>') {
                    return false;
                }
                command.text = format!("{typed}>");
                command.caret = Some(offset + 1);
                true
            }
            AutoEditStrategy::InterpolationCloser => {
                if command.typed() != Some('{') || !matches!(before(1), Some('$' | '#')) {
                    return false;
                }
                command.text = "{}".to_string();
                command.caret = Some(offset + 1);
                true
            }
            AutoEditStrategy::TagDoubleClosingPrevention => {
                let closes_here = after == Some('>')
                    && partition.end == offset + 1
                    && !partition.unterminated;
                if command.typed() != Some('>') || !closes_here {
                    return false;
                }
                consume(command);
                true
            }
            AutoEditStrategy::CommentCloser => {
                let opened =
                    before(3) == Some('<') && before(2) == Some('#') && before(1) == Some('-');
                if command.typed() != Some('-') || !opened {
                    return false;
                }
                // Swallow the `>` a tag closer put there.
                if after == Some('>') {
                    command.length = 1;
                }
                command.text = "-  -->".to_string();
                command.caret = Some(offset + 2);
                true
            }
            AutoEditStrategy::InterpolationDoubleClosingPrevention => {
                let closes_here = after == Some('}')
                    && partition.end == offset + 1
                    && !partition.unterminated;
                if command.typed() != Some('}') || !closes_here {
                    return false;
                }
                let opener_len = partition.partition_type.opener().chars().count();
                let body_start = (partition.start + opener_len).min(offset);
                let body = text.slice(body_start..offset).to_string();
                if brace_depth(&body) != 0 {
                    return false;
                }
                consume(command);
                true
            }
            AutoEditStrategy::AutoIndent => {
                if !matches!(command.text.as_str(), "\n" | "\r\n" | "\r") {
                    return false;
                }
                let line = text.char_to_line(offset.min(text.len_chars()));
                let line_start = text.line_to_char(line);
                let current = text.slice(line_start..offset.max(line_start)).to_string();
                let indent = LEADING_WHITESPACE
                    .as_ref()
                    .and_then(|re| re.find(&current))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                if indent.is_empty() {
                    return false;
                }
                command.text.push_str(indent);
                true
            }
        }
    }
}

/// Turn a keystroke into a caret move over the existing closer.
fn consume(command: &mut DocumentCommand) {
    command.text.clear();
    command.caret = Some(command.offset + 1);
}

/// Net `{`/`}` depth of an expression body, ignoring string literals.
fn brace_depth(body: &str) -> isize {
    let mut depth = 0isize;
    let mut quote = None;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            },
        }
    }
    depth
}
