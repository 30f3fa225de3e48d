//! Advisory diagnostics data model.
//!
//! Structural anomalies (an unterminated `${`, an `<#if>` that is never closed, an end tag with
//! no opener) are never errors. The reconciler reports them as [`Diagnostic`]s so hosts can
//! show markers, and [`diagnostic_intervals`] turns them into an overlay style layer.

use crate::intervals::{Interval, StyleId};

/// Style id for error-severity diagnostic underlines.
pub const DIAGNOSTIC_ERROR_STYLE_ID: StyleId = 0x0600_0001;
/// Style id for warning-severity diagnostic underlines.
pub const DIAGNOSTIC_WARNING_STYLE_ID: StyleId = 0x0600_0002;
/// Style id for information/hint diagnostic underlines.
pub const DIAGNOSTIC_INFO_STYLE_ID: StyleId = 0x0600_0003;

/// Diagnostic source reported by the core.
pub const DIAGNOSTIC_SOURCE: &str = "ftl";

/// A half-open character-offset range (`start..end`) in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticRange {
    /// Range start offset (inclusive), in chars from the start of the document.
    pub start: usize,
    /// Range end offset (exclusive), in chars from the start of the document.
    pub end: usize,
}

impl DiagnosticRange {
    /// Create a new diagnostic range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// Error diagnostics.
    Error,
    /// Warning diagnostics.
    Warning,
    /// Informational diagnostics.
    Information,
    /// Hint diagnostics.
    Hint,
}

/// Machine-readable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// A tag, interpolation or comment runs to end of document.
    Unterminated,
    /// A block directive or macro call has no end tag.
    UnclosedBlock,
    /// An end tag closes nothing.
    UnmatchedEndTag,
}

impl DiagnosticCode {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::Unterminated => "unterminated",
            DiagnosticCode::UnclosedBlock => "unclosed-block",
            DiagnosticCode::UnmatchedEndTag => "unmatched-end-tag",
        }
    }
}

/// A single diagnostic item for the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Diagnostic range in character offsets.
    pub range: DiagnosticRange,
    /// Diagnostic severity.
    pub severity: DiagnosticSeverity,
    /// Diagnostic code.
    pub code: DiagnosticCode,
    /// Diagnostic source.
    pub source: &'static str,
    /// Diagnostic message.
    pub message: String,
}

impl Diagnostic {
    /// A core diagnostic.
    pub fn new(
        range: DiagnosticRange,
        severity: DiagnosticSeverity,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            range,
            severity,
            code,
            source: DIAGNOSTIC_SOURCE,
            message: message.into(),
        }
    }
}

/// Overlay intervals for [`StyleLayerId::DIAGNOSTICS`](crate::StyleLayerId::DIAGNOSTICS).
pub fn diagnostic_intervals(diagnostics: &[Diagnostic]) -> Vec<Interval> {
    diagnostics
        .iter()
        .filter(|d| d.range.end > d.range.start)
        .map(|d| {
            let style_id = match d.severity {
                DiagnosticSeverity::Error => DIAGNOSTIC_ERROR_STYLE_ID,
                DiagnosticSeverity::Warning => DIAGNOSTIC_WARNING_STYLE_ID,
                DiagnosticSeverity::Information | DiagnosticSeverity::Hint => {
                    DIAGNOSTIC_INFO_STYLE_ID
                }
            };
            Interval::new(d.range.start, d.range.end, style_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_intervals_skip_empty_ranges() {
        let diagnostics = vec![
            Diagnostic::new(
                DiagnosticRange::new(3, 9),
                DiagnosticSeverity::Warning,
                DiagnosticCode::Unterminated,
                "`${` is never closed",
            ),
            Diagnostic::new(
                DiagnosticRange::new(4, 4),
                DiagnosticSeverity::Error,
                DiagnosticCode::UnmatchedEndTag,
                "nothing to close",
            ),
        ];
        assert_eq!(
            diagnostic_intervals(&diagnostics),
            vec![Interval::new(3, 9, DIAGNOSTIC_WARNING_STYLE_ID)]
        );
        assert_eq!(diagnostics[0].source, "ftl");
        assert_eq!(diagnostics[0].code.as_str(), "unterminated");
    }
}
