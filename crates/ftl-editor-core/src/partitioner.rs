//! Full and incremental partitioning.
//!
//! The scanner walks the document left to right and emits one partition per construct. Inside a
//! construct it keeps an explicit stack of open lexical frames (parentheses, brackets, braces,
//! string literals and `${...}` inside strings) so that a `>` inside `(a > b)` or a `}` inside a
//! string does not close the construct. Between partitions that stack is always empty; the only
//! state carried across a boundary is the [`BlockScope`] of open block directives, which is what
//! the incremental repair compares when it looks for a resync point.
//!
//! # Markers
//!
//! In priority order: `<#--` (comment), `</#`, `</@`, `<#`, `<@`, `${`, `#{`. Unmatched closers
//! are literal text. An opener without its closer runs to end of document and is flagged
//! [`Partition::unterminated`].

use crate::delta::DamageRegion;
use crate::error::{EngineError, Result};
use crate::partition::{BlockScope, Partition, PartitionType, partition_index_at};
use ftl_lang::{DirectiveKind, is_identifier_char, is_name_char};
use ropey::Rope;
use ropey::iter::Chars;
use std::collections::VecDeque;
use std::ops::Range;

/// Longest marker length minus one: an edit at `offset` can change the marker that starts at
/// `offset - MARKER_LOOKBEHIND` at the earliest.
pub(crate) const MARKER_LOOKBEHIND: usize = 3;

/// How a partition list was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// The edit stayed inside one text partition and touched no marker; later partitions
    /// were only shifted.
    Shifted,
    /// A local rescan re-synchronized with the old partition list.
    Resynced,
    /// No resync point was found; the rescan ran to end of document.
    ScannedToEnd,
    /// Full-document scan.
    Full,
}

/// Result of [`repair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// The updated partition list.
    pub partitions: Vec<Partition>,
    /// Post-edit range whose partitions were re-derived (not merely shifted).
    pub changed: Range<usize>,
    /// Which path produced the result.
    pub mode: RepairMode,
}

/// Partition the whole document.
pub fn compute_partitions(text: &Rope) -> Vec<Partition> {
    let mut scanner = Scanner::new(text, 0, BlockScope::root());
    let mut partitions = Vec::new();
    while let Some(partition) = scanner.next_partition() {
        partitions.push(partition);
    }
    if partitions.is_empty() {
        partitions.push(Partition::new(0, 0, PartitionType::Text));
    }
    partitions
}

/// Bring `old` (the partitions of the pre-edit text) up to date with `text` (the post-edit
/// text) after the edit described by `damage`.
///
/// Rescans from the partition containing `offset - 3` and stops at the first boundary at or
/// after `offset + new_length` where the old list has a partition of the same type and block
/// scope at the length-adjusted offset. Without such a point the scan runs to end of document.
///
/// Returns [`EngineError::DamageOutOfBounds`] if `damage` does not fit `text` or `old`.
pub fn repair(old: &[Partition], text: &Rope, damage: &DamageRegion) -> Result<RepairOutcome> {
    let len = text.len_chars();
    let old_len = len
        .checked_add(damage.original_length)
        .and_then(|sum| sum.checked_sub(damage.new_length));
    let fits = damage.new_end() <= len
        && old_len.is_some_and(|old_len| {
            damage.old_end() <= old_len && old.last().is_some_and(|last| last.end == old_len)
        });
    if !fits {
        tracing::error!(
            offset = damage.offset,
            original_length = damage.original_length,
            new_length = damage.new_length,
            len,
            "damage region does not fit the document"
        );
        return Err(EngineError::DamageOutOfBounds {
            offset: damage.offset,
            original_length: damage.original_length,
            new_length: damage.new_length,
            len,
        });
    }

    if let Some(outcome) = try_shift(old, text, damage) {
        tracing::trace!(offset = damage.offset, delta = damage.delta(), "repair: shifted");
        return Ok(outcome);
    }

    let start_idx =
        partition_index_at(old, damage.offset.saturating_sub(MARKER_LOOKBEHIND)).unwrap_or(0);
    let scan_start = old[start_idx].start;
    let resync_from = damage.new_end();
    let delta = damage.delta();

    let mut partitions: Vec<Partition> = old[..start_idx].to_vec();
    let mut scanner = Scanner::new(text, scan_start, old[start_idx].scope.clone());

    loop {
        let pos = scanner.pos();
        if pos >= len {
            break;
        }
        if pos >= resync_from {
            let old_pos = pos - damage.new_length + damage.original_length;
            if let Ok(j) = old.binary_search_by_key(&old_pos, |p| p.start) {
                let candidate = &old[j];
                if candidate.partition_type == scanner.peek_type()
                    && candidate.scope == *scanner.scope()
                {
                    partitions.extend(old[j..].iter().map(|p| p.shifted(delta)));
                    tracing::trace!(
                        offset = damage.offset,
                        rescanned_from = scan_start,
                        resync = pos,
                        "repair: resynced"
                    );
                    return Ok(RepairOutcome {
                        partitions,
                        changed: scan_start..pos,
                        mode: RepairMode::Resynced,
                    });
                }
            }
        }
        match scanner.next_partition() {
            Some(partition) => partitions.push(partition),
            None => break,
        }
    }

    if partitions.is_empty() {
        partitions.push(Partition::new(0, 0, PartitionType::Text));
    }
    if scan_start == 0 && len > 0 {
        tracing::warn!(
            offset = damage.offset,
            len,
            "repair: no resync point, rescanned whole document"
        );
    } else {
        tracing::trace!(
            offset = damage.offset,
            rescanned_from = scan_start,
            "repair: scanned to end"
        );
    }
    Ok(RepairOutcome {
        partitions,
        changed: scan_start..len,
        mode: RepairMode::ScannedToEnd,
    })
}

/// A full rescan packaged as a [`RepairOutcome`].
pub fn full_outcome(text: &Rope) -> RepairOutcome {
    RepairOutcome {
        partitions: compute_partitions(text),
        changed: 0..text.len_chars(),
        mode: RepairMode::Full,
    }
}

/// The fast path: an edit strictly inside one text partition with no marker character near it.
fn try_shift(old: &[Partition], text: &Rope, damage: &DamageRegion) -> Option<RepairOutcome> {
    let idx = partition_index_at(old, damage.offset)?;
    let target = &old[idx];
    if target.partition_type != PartitionType::Text || damage.old_end() > target.end {
        return None;
    }

    let new_end = (target.end + damage.new_length)
        .checked_sub(damage.original_length)
        .filter(|&end| end > target.start || text.len_chars() == 0)?;

    let len = text.len_chars();
    let window_start = damage.offset.saturating_sub(MARKER_LOOKBEHIND);
    let window_end = (damage.new_end() + MARKER_LOOKBEHIND).min(len);
    let touches_marker = text
        .slice(window_start..window_end)
        .chars()
        .any(|c| matches!(c, '<' | '$' | '#'));
    if touches_marker {
        return None;
    }

    let delta = damage.delta();
    let mut partitions = Vec::with_capacity(old.len());
    partitions.extend_from_slice(&old[..idx]);
    let mut resized = target.clone();
    resized.end = new_end;
    partitions.push(resized);
    partitions.extend(old[idx + 1..].iter().map(|p| p.shifted(delta)));

    Some(RepairOutcome {
        partitions,
        changed: target.start..new_end,
        mode: RepairMode::Shifted,
    })
}

/// Char cursor over a rope with a small lookahead buffer.
struct Cursor<'a> {
    chars: Chars<'a>,
    ahead: VecDeque<char>,
    pos: usize,
    prev: Option<char>,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a Rope, pos: usize) -> Self {
        let prev = pos.checked_sub(1).and_then(|p| text.get_char(p));
        Self {
            chars: text.chars_at(pos),
            ahead: VecDeque::with_capacity(4),
            pos,
            prev,
        }
    }

    fn peek_at(&mut self, n: usize) -> Option<char> {
        while self.ahead.len() <= n {
            let c = self.chars.next()?;
            self.ahead.push_back(c);
        }
        Some(self.ahead[n])
    }

    fn peek(&mut self) -> Option<char> {
        self.peek_at(0)
    }

    fn bump(&mut self) -> Option<char> {
        let c = match self.ahead.pop_front() {
            Some(c) => c,
            None => self.chars.next()?,
        };
        self.pos += 1;
        self.prev = Some(c);
        Some(c)
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.bump().is_none() {
                break;
            }
        }
    }

    fn starts_with(&mut self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, expected)| self.peek_at(i) == Some(expected))
    }

    fn marker(&mut self) -> PartitionType {
        match (self.peek_at(0), self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some('<'), Some('#'), Some('-'), Some('-')) => PartitionType::Comment,
            (Some('<'), Some('/'), Some('#'), _) => PartitionType::DirectiveEnd,
            (Some('<'), Some('/'), Some('@'), _) => PartitionType::MacroInstanceEnd,
            (Some('<'), Some('#'), _, _) => PartitionType::DirectiveStart,
            (Some('<'), Some('@'), _, _) => PartitionType::MacroInstanceStart,
            (Some('$'), Some('{'), _, _) => PartitionType::DollarInterpolation,
            (Some('#'), Some('{'), _, _) => PartitionType::HashInterpolation,
            _ => PartitionType::Text,
        }
    }

    fn take_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|&c| is_name_char(c)) {
            name.push(c);
            self.bump();
        }
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Paren,
    Bracket,
    Brace,
    Str { quote: char, raw: bool },
    StrInterp,
}

/// What closes the expression body being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEnd {
    /// `>` outside parentheses and strings.
    Tag,
    /// `}` at brace depth 0.
    Interpolation,
}

#[derive(Debug, Default)]
struct BodyScan {
    terminated: bool,
    self_closing: bool,
    saw_assignment: bool,
}

struct Scanner<'a> {
    cursor: Cursor<'a>,
    scope: BlockScope,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a Rope, pos: usize, scope: BlockScope) -> Self {
        Self {
            cursor: Cursor::new(text, pos),
            scope,
        }
    }

    fn pos(&self) -> usize {
        self.cursor.pos
    }

    fn scope(&self) -> &BlockScope {
        &self.scope
    }

    fn peek_type(&mut self) -> PartitionType {
        self.cursor.marker()
    }

    fn next_partition(&mut self) -> Option<Partition> {
        self.cursor.peek()?;
        let start = self.cursor.pos;
        let entry_scope = self.scope.clone();
        let partition_type = self.cursor.marker();
        let cursor = &mut self.cursor;
        cursor.bump_n(partition_type.opener().chars().count());

        let mut unterminated = false;
        match partition_type {
            PartitionType::Text => {
                while cursor.peek().is_some() && cursor.marker() == PartitionType::Text {
                    cursor.bump();
                }
            }
            PartitionType::Comment => loop {
                if cursor.starts_with("-->") {
                    cursor.bump_n(3);
                    break;
                }
                if cursor.bump().is_none() {
                    unterminated = true;
                    break;
                }
            },
            PartitionType::DirectiveEnd | PartitionType::MacroInstanceEnd => {
                let name = cursor.take_name();
                unterminated = !skip_past(cursor, '>');
                let popped = if partition_type == PartitionType::DirectiveEnd {
                    self.scope.pop_matching(|open| !name.is_empty() && open == name)
                } else if name.is_empty() {
                    self.scope.pop_matching(|open| open.starts_with('@'))
                } else {
                    self.scope
                        .pop_matching(|open| open.strip_prefix('@') == Some(name.as_str()))
                };
                if let Some(scope) = popped {
                    self.scope = scope;
                }
            }
            PartitionType::DirectiveStart | PartitionType::MacroInstanceStart => {
                let name = cursor.take_name();
                let body = scan_body(cursor, BodyEnd::Tag);
                unterminated = !body.terminated;
                if !name.is_empty() && !body.self_closing {
                    if partition_type == PartitionType::MacroInstanceStart {
                        self.scope = self.scope.push(&format!("@{name}"));
                    } else if opens_block(&name, body.saw_assignment) {
                        self.scope = self.scope.push(&name);
                    }
                }
            }
            PartitionType::DollarInterpolation | PartitionType::HashInterpolation => {
                unterminated = !scan_body(cursor, BodyEnd::Interpolation).terminated;
            }
        }

        let nesting_depth = if partition_type.is_end_tag() {
            self.scope.depth()
        } else {
            entry_scope.depth()
        };
        Some(Partition {
            start,
            end: self.cursor.pos,
            partition_type,
            nesting_depth,
            unterminated,
            scope: entry_scope,
        })
    }
}

/// Whether `<#name ...>` opens a block that a later `</#name>` closes.
pub(crate) fn opens_block(name: &str, has_assignment: bool) -> bool {
    match ftl_lang::directive(name).map(|spec| spec.kind) {
        Some(DirectiveKind::Block) => true,
        Some(DirectiveKind::CaptureBlock) => !has_assignment,
        _ => false,
    }
}

fn skip_past(cursor: &mut Cursor<'_>, closer: char) -> bool {
    while let Some(c) = cursor.bump() {
        if c == closer {
            return true;
        }
    }
    false
}

fn scan_body(cursor: &mut Cursor<'_>, end: BodyEnd) -> BodyScan {
    let mut frames: Vec<Frame> = Vec::new();
    let mut scan = BodyScan::default();

    while let Some(c) = cursor.peek() {
        if let Some(&Frame::Str { quote, raw }) = frames.last() {
            if !raw && c == '\\' {
                cursor.bump_n(2);
                continue;
            }
            if c == quote {
                frames.pop();
            } else if !raw && matches!(c, '$' | '#') && cursor.peek_at(1) == Some('{') {
                cursor.bump();
                frames.push(Frame::StrInterp);
            }
            cursor.bump();
            continue;
        }

        match c {
            '"' | '\'' => frames.push(Frame::Str { quote: c, raw: false }),
            'r' if !cursor.prev.is_some_and(is_identifier_char)
                && matches!(cursor.peek_at(1), Some('"' | '\'')) =>
            {
                cursor.bump();
                if let Some(quote) = cursor.peek() {
                    frames.push(Frame::Str { quote, raw: true });
                }
            }
            '(' => frames.push(Frame::Paren),
            '[' => frames.push(Frame::Bracket),
            '{' => frames.push(Frame::Brace),
            ')' => pop_if(&mut frames, Frame::Paren),
            ']' => pop_if(&mut frames, Frame::Bracket),
            '}' => match frames.last() {
                Some(Frame::Brace | Frame::StrInterp) => {
                    frames.pop();
                }
                None if end == BodyEnd::Interpolation => {
                    cursor.bump();
                    scan.terminated = true;
                    return scan;
                }
                _ => {}
            },
            '>' if end == BodyEnd::Tag
                && !frames
                    .iter()
                    .any(|f| matches!(f, Frame::Paren | Frame::StrInterp)) =>
            {
                scan.self_closing = cursor.prev == Some('/');
                cursor.bump();
                scan.terminated = true;
                return scan;
            }
            '=' if frames.is_empty() => scan.saw_assignment = true,
            _ => {}
        }
        cursor.bump();
    }
    scan
}

fn pop_if(frames: &mut Vec<Frame>, expected: Frame) {
    if frames.last() == Some(&expected) {
        frames.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DocumentEdit;
    use crate::partition::validate_tiling;
    use PartitionType::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<(PartitionType, String)> {
        let rope = Rope::from_str(text);
        compute_partitions(&rope)
            .iter()
            .map(|p| (p.partition_type, rope.slice(p.start..p.end).to_string()))
            .collect()
    }

    fn edit_and_repair(text: &str, edit: DocumentEdit) -> (RepairOutcome, Vec<Partition>) {
        let mut rope = Rope::from_str(text);
        let old = compute_partitions(&rope);
        rope.remove(edit.offset..edit.removed_end());
        rope.insert(edit.offset, &edit.inserted_text);
        let outcome = repair(&old, &rope, &edit.damage()).unwrap();
        (outcome, compute_partitions(&rope))
    }

    #[test]
    fn test_hello_interpolation() {
        assert_eq!(
            kinds("Hello ${name}!"),
            vec![
                (Text, "Hello ".to_string()),
                (DollarInterpolation, "${name}".to_string()),
                (Text, "!".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_document() {
        let parts = compute_partitions(&Rope::new());
        assert_eq!(parts, vec![Partition::new(0, 0, Text)]);
    }

    #[test]
    fn test_marker_priority() {
        assert_eq!(
            kinds("<#-- c --><#if x></#if><@m/></@m>#{n}"),
            vec![
                (Comment, "<#-- c -->".to_string()),
                (DirectiveStart, "<#if x>".to_string()),
                (DirectiveEnd, "</#if>".to_string()),
                (MacroInstanceStart, "<@m/>".to_string()),
                (MacroInstanceEnd, "</@m>".to_string()),
                (HashInterpolation, "#{n}".to_string()),
            ]
        );
    }

    #[test]
    fn test_gt_inside_parens_and_strings() {
        assert_eq!(
            kinds("<#if (a > b) && s == \">\">x"),
            vec![
                (DirectiveStart, "<#if (a > b) && s == \">\">".to_string()),
                (Text, "x".to_string()),
            ]
        );
        assert_eq!(
            kinds("${ {'a': \"}\"}['a'] }."),
            vec![
                (DollarInterpolation, "${ {'a': \"}\"}['a'] }".to_string()),
                (Text, ".".to_string()),
            ]
        );
    }

    #[test]
    fn test_interpolation_inside_string_literal() {
        assert_eq!(
            kinds("<#assign s = \"${a > b}\">!"),
            vec![
                (DirectiveStart, "<#assign s = \"${a > b}\">".to_string()),
                (Text, "!".to_string()),
            ]
        );
        assert_eq!(
            kinds("<#assign p = r\"C:\\\">!"),
            vec![
                (DirectiveStart, "<#assign p = r\"C:\\\">".to_string()),
                (Text, "!".to_string()),
            ]
        );
    }

    #[test]
    fn test_unmatched_closers_are_text() {
        assert_eq!(kinds("a } > --> b"), vec![(Text, "a } > --> b".to_string())]);
    }

    #[test]
    fn test_unterminated_constructs_run_to_eof() {
        let rope = Rope::from_str("abc <#if x");
        let parts = compute_partitions(&rope);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].partition_type, DirectiveStart);
        assert_eq!(parts[1].range(), 4..10);
        assert!(parts[1].unterminated);

        let parts = compute_partitions(&Rope::from_str("${a <#-- x"));
        assert_eq!(parts.len(), 1);
        assert!(parts[0].unterminated);
        assert_eq!(parts[0].partition_type, DollarInterpolation);
    }

    #[test]
    fn test_nesting_depth() {
        let rope = Rope::from_str("<#list xs as x><#if x>${x}</#if><#assign y = 1></#list>");
        let depths: Vec<_> = compute_partitions(&rope)
            .iter()
            .map(|p| (p.partition_type, p.nesting_depth))
            .collect();
        assert_eq!(
            depths,
            vec![
                (DirectiveStart, 0),
                (DirectiveStart, 1),
                (DollarInterpolation, 2),
                (DirectiveEnd, 1),
                (DirectiveStart, 1),
                (DirectiveEnd, 0),
            ]
        );
    }

    #[test]
    fn test_capture_assign_and_macro_calls_open_blocks() {
        let rope = Rope::from_str("<#assign x>a</#assign><@box title='t'>b</@box><@br/>c");
        let parts = compute_partitions(&rope);
        let depths: Vec<_> = parts.iter().map(|p| p.nesting_depth).collect();
        assert_eq!(depths, vec![0, 1, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_unmatched_end_tag_is_ignored() {
        let rope = Rope::from_str("<#if a></#list>x</#if>");
        let parts = compute_partitions(&rope);
        let depths: Vec<_> = parts.iter().map(|p| p.nesting_depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_end_tag_pops_to_nearest_match() {
        let rope = Rope::from_str("<#list a><#if b></#list>");
        let parts = compute_partitions(&rope);
        assert_eq!(parts[2].nesting_depth, 0);
        assert_eq!(parts[2].partition_type, DirectiveEnd);
    }

    #[test]
    fn test_repair_inside_text_shifts() {
        let (outcome, full) = edit_and_repair("Hello ${name}!", DocumentEdit::insert(2, "yy"));
        assert_eq!(outcome.mode, RepairMode::Shifted);
        assert_eq!(outcome.partitions, full);
        assert_eq!(outcome.changed, 0..8);
    }

    #[test]
    fn test_repair_resyncs_after_interpolation_edit() {
        let text = "a ${x} b <#if c>d</#if> e ${f}";
        let (outcome, full) = edit_and_repair(text, DocumentEdit::insert(4, "yz"));
        assert_eq!(outcome.mode, RepairMode::Resynced);
        assert_eq!(outcome.partitions, full);
        validate_tiling(&outcome.partitions, 32).unwrap();
    }

    #[test]
    fn test_repair_opening_unterminated_tag_scans_to_end() {
        let (outcome, full) = edit_and_repair("Hello ${a} world", DocumentEdit::insert(16, "<#"));
        assert_eq!(outcome.partitions, full);
        let last = outcome.partitions.last().unwrap();
        assert_eq!(last.partition_type, DirectiveStart);
        assert!(last.unterminated);
        assert_eq!(last.range(), 16..18);
    }

    #[test]
    fn test_repair_turning_tag_into_comment() {
        let text = "x <#-a> y ${b} z";
        let (outcome, full) = edit_and_repair(text, DocumentEdit::insert(5, "-"));
        assert_eq!(outcome.partitions, full);
        assert_eq!(outcome.mode, RepairMode::ScannedToEnd);
        assert!(outcome.partitions[1].unterminated);
    }

    #[test]
    fn test_repair_scope_change_prevents_resync() {
        let text = "<#if a>x</#if>y<#list b>z</#list>";
        let (outcome, full) = edit_and_repair(text, DocumentEdit::delete(8, 6));
        assert_eq!(outcome.partitions, full);
    }

    #[test]
    fn test_repair_to_empty_and_back() {
        let (outcome, full) = edit_and_repair("${a}", DocumentEdit::delete(0, 4));
        assert_eq!(outcome.partitions, vec![Partition::new(0, 0, Text)]);
        assert_eq!(outcome.partitions, full);

        let (outcome, full) = edit_and_repair("", DocumentEdit::insert(0, "hi"));
        assert_eq!(outcome.mode, RepairMode::Shifted);
        assert_eq!(outcome.partitions, full);
    }

    #[test]
    fn test_repair_rejects_out_of_bounds_damage() {
        let rope = Rope::from_str("abc");
        let old = compute_partitions(&rope);
        let err = repair(&old, &rope, &DamageRegion::new(2, 0, 5)).unwrap_err();
        assert!(matches!(err, EngineError::DamageOutOfBounds { .. }));

        let err = repair(&old, &rope, &DamageRegion::new(0, 2, 0)).unwrap_err();
        assert!(matches!(err, EngineError::DamageOutOfBounds { .. }));

        let err = repair(&old, &rope, &DamageRegion::new(1, usize::MAX, 0)).unwrap_err();
        assert!(matches!(err, EngineError::DamageOutOfBounds { .. }));
    }
}
