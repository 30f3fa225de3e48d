//! Syntax coloring driven by partitions.
//!
//! After every edit the [`PresentationReconciler`] re-tokenizes only the partitions that
//! intersect the damaged region, maps token kinds to [`StyleId`]s through a [`StyleTheme`], and
//! keeps the result for the whole document in an [`IntervalTree`]. Hosts that paint per
//! partition type register a [`StylingRenderer`]; it receives each restyled partition with its
//! intervals.

use crate::damage::partitions_in;
use crate::delta::DamageRegion;
use crate::intervals::{Interval, IntervalTree, StyleId, StyleLayerId};
use crate::lexer::{TokenKind, tokenize};
use crate::partition::{Partition, PartitionType};
use ropey::Rope;
use std::ops::Range;

// Default `StyleId` constants for FTL coloring.
//
// These are only identifiers. UI/theme layer is expected to map them to actual colors.

/// Literal template text.
pub const FTL_STYLE_TEXT: StyleId = 0x0500_0001;
/// `<#-- ... -->`.
pub const FTL_STYLE_COMMENT: StyleId = 0x0500_0002;
/// `<#`, `</@`, `>`, `/>`.
pub const FTL_STYLE_TAG_DELIMITER: StyleId = 0x0500_0003;
/// Directive names.
pub const FTL_STYLE_DIRECTIVE: StyleId = 0x0500_0004;
/// Macro names in calls.
pub const FTL_STYLE_MACRO: StyleId = 0x0500_0005;
/// Expression keywords.
pub const FTL_STYLE_KEYWORD: StyleId = 0x0500_0006;
/// Identifiers.
pub const FTL_STYLE_IDENTIFIER: StyleId = 0x0500_0007;
/// Operators.
pub const FTL_STYLE_OPERATOR: StyleId = 0x0500_0008;
/// String literals.
pub const FTL_STYLE_STRING: StyleId = 0x0500_0009;
/// Number literals.
pub const FTL_STYLE_NUMBER: StyleId = 0x0500_000A;
/// `?builtin` calls.
pub const FTL_STYLE_BUILTIN: StyleId = 0x0500_000B;
/// Brackets and separators.
pub const FTL_STYLE_PUNCTUATION: StyleId = 0x0500_000C;
/// `${`, `#{` and `}`.
pub const FTL_STYLE_INTERPOLATION: StyleId = 0x0500_000D;
/// Unrecognized input.
pub const FTL_STYLE_ERROR: StyleId = 0x0500_00FF;

/// Mapping from token kind to style id.
///
/// White-space maps to `None` and produces no interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleTheme {
    styles: [Option<StyleId>; TokenKind::ALL.len()],
}

impl Default for StyleTheme {
    fn default() -> Self {
        let mut theme = Self {
            styles: [None; TokenKind::ALL.len()],
        };
        for kind in TokenKind::ALL {
            theme.styles[kind.index()] = match kind {
                TokenKind::TagDelimiter => Some(FTL_STYLE_TAG_DELIMITER),
                TokenKind::DirectiveName => Some(FTL_STYLE_DIRECTIVE),
                TokenKind::MacroName => Some(FTL_STYLE_MACRO),
                TokenKind::Keyword => Some(FTL_STYLE_KEYWORD),
                TokenKind::Identifier => Some(FTL_STYLE_IDENTIFIER),
                TokenKind::Operator => Some(FTL_STYLE_OPERATOR),
                TokenKind::String => Some(FTL_STYLE_STRING),
                TokenKind::Number => Some(FTL_STYLE_NUMBER),
                TokenKind::Builtin => Some(FTL_STYLE_BUILTIN),
                TokenKind::Punctuation => Some(FTL_STYLE_PUNCTUATION),
                TokenKind::InterpolationDelimiter => Some(FTL_STYLE_INTERPOLATION),
                TokenKind::Comment => Some(FTL_STYLE_COMMENT),
                TokenKind::Text => Some(FTL_STYLE_TEXT),
                TokenKind::Whitespace => None,
                TokenKind::Error => Some(FTL_STYLE_ERROR),
            };
        }
        theme
    }
}

impl StyleTheme {
    /// Style for `kind`, if it is painted at all.
    pub fn style_for(&self, kind: TokenKind) -> Option<StyleId> {
        self.styles[kind.index()]
    }

    /// Override the style of one token kind.
    pub fn with_style(mut self, kind: TokenKind, style: Option<StyleId>) -> Self {
        self.styles[kind.index()] = style;
        self
    }
}

/// Receives the styled intervals of each restyled partition.
pub trait StylingRenderer: Send {
    /// Called once per restyled partition; `intervals` lie inside `partition`.
    fn render(&mut self, partition: &Partition, intervals: &[Interval]);
}

impl<F> StylingRenderer for F
where
    F: FnMut(&Partition, &[Interval]) + Send,
{
    fn render(&mut self, partition: &Partition, intervals: &[Interval]) {
        self(partition, intervals)
    }
}

/// Style intervals of one partition.
pub fn style_partition(text: &Rope, partition: &Partition, theme: &StyleTheme) -> Vec<Interval> {
    let source = text.slice(partition.start..partition.end).to_string();
    tokenize(&source, partition.partition_type, partition.start)
        .filter_map(|token| {
            let style = theme.style_for(token.kind)?;
            (!token.range.is_empty())
                .then(|| Interval::new(token.range.start, token.range.end, style))
        })
        .collect()
}

/// Incremental coloring state for one document.
pub struct PresentationReconciler {
    theme: StyleTheme,
    renderers: [Option<Box<dyn StylingRenderer>>; PartitionType::COUNT],
    styles: IntervalTree,
}

impl std::fmt::Debug for PresentationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<_> = PartitionType::ALL
            .into_iter()
            .filter(|ty| self.renderers[ty.index()].is_some())
            .collect();
        f.debug_struct("PresentationReconciler")
            .field("theme", &self.theme)
            .field("renderers", &registered)
            .field("styles", &self.styles.len())
            .finish()
    }
}

impl Default for PresentationReconciler {
    fn default() -> Self {
        Self::new(StyleTheme::default())
    }
}

impl PresentationReconciler {
    /// Create a reconciler with no renderers.
    pub fn new(theme: StyleTheme) -> Self {
        Self {
            theme,
            renderers: std::array::from_fn(|_| None),
            styles: IntervalTree::new(),
        }
    }

    /// The style layer these intervals belong to.
    pub fn layer(&self) -> StyleLayerId {
        StyleLayerId::SYNTAX
    }

    /// Active theme.
    pub fn theme(&self) -> &StyleTheme {
        &self.theme
    }

    /// Style intervals of the whole document.
    pub fn styles(&self) -> &IntervalTree {
        &self.styles
    }

    /// Register the renderer for `partition_type`, returning the one it replaces.
    pub fn register_renderer(
        &mut self,
        partition_type: PartitionType,
        renderer: impl StylingRenderer + 'static,
    ) -> Option<Box<dyn StylingRenderer>> {
        self.renderers[partition_type.index()].replace(Box::new(renderer))
    }

    /// Style the whole document from scratch.
    pub fn highlight_all(&mut self, text: &Rope, partitions: &[Partition]) -> Vec<Interval> {
        self.styles.clear();
        self.restyle(text, partitions, 0..text.len_chars())
    }

    /// Shift the stored styles for `damage` and restyle `region` (post-edit coordinates).
    pub fn apply_damage(
        &mut self,
        damage: &DamageRegion,
        text: &Rope,
        partitions: &[Partition],
        region: Range<usize>,
    ) -> Vec<Interval> {
        self.styles.update_for_deletion(damage.offset, damage.old_end());
        self.styles.update_for_insertion(damage.offset, damage.new_length);
        self.restyle(text, partitions, region)
    }

    fn restyle(
        &mut self,
        text: &Rope,
        partitions: &[Partition],
        region: Range<usize>,
    ) -> Vec<Interval> {
        let indices = partitions_in(partitions, &region);
        let Some(first) = partitions.get(indices.start) else {
            return Vec::new();
        };
        let span_start = first.start.min(region.start);
        let span_end = partitions
            .get(indices.end.saturating_sub(1))
            .map_or(region.end, |last| last.end.max(region.end));

        let mut emitted = Vec::new();
        for partition in &partitions[indices] {
            let intervals = style_partition(text, partition, &self.theme);
            if let Some(renderer) = self.renderers[partition.partition_type.index()].as_mut() {
                renderer.render(partition, &intervals);
            }
            emitted.extend(intervals);
        }
        self.styles.replace_range(span_start, span_end, emitted.iter().cloned());
        tracing::trace!(
            start = span_start,
            end = span_end,
            intervals = emitted.len(),
            "restyled damaged region"
        );
        emitted
    }
}
