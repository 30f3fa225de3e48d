//! Partition data model.
//!
//! A partition is a maximal contiguous span of the document assigned one structural category.
//! The partitions of a document tile it: `partitions[i].end == partitions[i + 1].start`, the
//! first starts at 0 and the last ends at the document length. An empty document has a single
//! empty [`PartitionType::Text`] partition.

use crate::error::{EngineError, Result};
use ropey::Rope;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// The closed set of partition categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionType {
    /// Literal template text.
    Text,
    /// `<#name ...>`
    DirectiveStart,
    /// `</#name>`
    DirectiveEnd,
    /// `<@name ...>` (user-defined directive call).
    MacroInstanceStart,
    /// `</@name>`
    MacroInstanceEnd,
    /// `${expression}`
    DollarInterpolation,
    /// `#{expression}` (legacy numerical interpolation).
    HashInterpolation,
    /// `<#-- ... -->`
    Comment,
}

impl PartitionType {
    /// Every partition type, in declaration order.
    pub const ALL: [PartitionType; 8] = [
        PartitionType::Text,
        PartitionType::DirectiveStart,
        PartitionType::DirectiveEnd,
        PartitionType::MacroInstanceStart,
        PartitionType::MacroInstanceEnd,
        PartitionType::DollarInterpolation,
        PartitionType::HashInterpolation,
        PartitionType::Comment,
    ];

    /// Number of partition types.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index of this type, usable for per-type tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable content-type name, for hosts that key configuration by string.
    pub const fn content_type(self) -> &'static str {
        match self {
            PartitionType::Text => "__ftl_text",
            PartitionType::DirectiveStart => "__ftl_directive_start",
            PartitionType::DirectiveEnd => "__ftl_directive_end",
            PartitionType::MacroInstanceStart => "__ftl_macro_instance_start",
            PartitionType::MacroInstanceEnd => "__ftl_macro_instance_end",
            PartitionType::DollarInterpolation => "__ftl_dollar_interpolation",
            PartitionType::HashInterpolation => "__ftl_hash_interpolation",
            PartitionType::Comment => "__ftl_comment",
        }
    }

    /// Look a type up by its content-type name.
    pub fn from_content_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.content_type() == name)
    }

    /// Nesting rank: text is 0, tags are 1, interpolations and comments are 2.
    pub const fn rank(self) -> u8 {
        match self {
            PartitionType::Text => 0,
            PartitionType::DirectiveStart
            | PartitionType::DirectiveEnd
            | PartitionType::MacroInstanceStart
            | PartitionType::MacroInstanceEnd => 1,
            PartitionType::DollarInterpolation
            | PartitionType::HashInterpolation
            | PartitionType::Comment => 2,
        }
    }

    /// Whether a construct of type `inner` may appear directly inside this one as its own partition.
    ///
    /// Only text contains other partitions. Interpolations inside a tag's string literals are
    /// lexed as part of the tag, never partitioned.
    pub fn may_contain(self, inner: PartitionType) -> bool {
        self.rank() == 0 && inner.rank() > 0
    }

    /// `<#...>`, `</#...>`, `<@...>` or `</@...>`.
    pub const fn is_tag(self) -> bool {
        self.rank() == 1
    }

    /// `${...}` or `#{...}`.
    pub const fn is_interpolation(self) -> bool {
        matches!(
            self,
            PartitionType::DollarInterpolation | PartitionType::HashInterpolation
        )
    }

    /// `</#...>` or `</@...>`.
    pub const fn is_end_tag(self) -> bool {
        matches!(
            self,
            PartitionType::DirectiveEnd | PartitionType::MacroInstanceEnd
        )
    }

    /// The text that opens a partition of this type (empty for text).
    pub const fn opener(self) -> &'static str {
        match self {
            PartitionType::Text => "",
            PartitionType::DirectiveStart => "<#",
            PartitionType::DirectiveEnd => "</#",
            PartitionType::MacroInstanceStart => "<@",
            PartitionType::MacroInstanceEnd => "</@",
            PartitionType::DollarInterpolation => "${",
            PartitionType::HashInterpolation => "#{",
            PartitionType::Comment => "<#--",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionType::Text => "TEXT",
            PartitionType::DirectiveStart => "DIRECTIVE_START",
            PartitionType::DirectiveEnd => "DIRECTIVE_END",
            PartitionType::MacroInstanceStart => "MACRO_INSTANCE_START",
            PartitionType::MacroInstanceEnd => "MACRO_INSTANCE_END",
            PartitionType::DollarInterpolation => "DOLLAR_INTERPOLATION",
            PartitionType::HashInterpolation => "HASH_INTERPOLATION",
            PartitionType::Comment => "COMMENT",
        };
        f.write_str(name)
    }
}

#[derive(PartialEq, Eq)]
struct ScopeFrame {
    name: Box<str>,
    depth: usize,
    parent: BlockScope,
}

/// The stack of open block constructs at some point of the document, innermost first.
///
/// Frames are shared between partitions, so cloning a scope is O(1). Macro calls are recorded
/// as `@name`.
#[derive(Clone, Default)]
pub struct BlockScope(Option<Arc<ScopeFrame>>);

impl BlockScope {
    /// The empty scope (top level).
    pub fn root() -> Self {
        Self(None)
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |frame| frame.depth)
    }

    /// Name of the innermost open block.
    pub fn innermost(&self) -> Option<&str> {
        self.0.as_ref().map(|frame| &*frame.name)
    }

    /// Open block names, innermost first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut cursor = self.0.as_deref();
        std::iter::from_fn(move || {
            let frame = cursor?;
            cursor = frame.parent.0.as_deref();
            Some(&*frame.name)
        })
    }

    pub(crate) fn push(&self, name: &str) -> Self {
        Self(Some(Arc::new(ScopeFrame {
            name: name.into(),
            depth: self.depth() + 1,
            parent: self.clone(),
        })))
    }

    /// Pop down to (and including) the nearest frame accepted by `matches`.
    ///
    /// Returns `None` when no frame matches; the end tag is then not structural.
    pub(crate) fn pop_matching(&self, matches: impl Fn(&str) -> bool) -> Option<Self> {
        let mut cursor = self.0.as_ref();
        while let Some(frame) = cursor {
            if matches(&frame.name) {
                return Some(frame.parent.clone());
            }
            cursor = frame.parent.0.as_ref();
        }
        None
    }
}

impl PartialEq for BlockScope {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for BlockScope {}

impl fmt::Debug for BlockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A typed span of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Start offset (inclusive, chars).
    pub start: usize,
    /// End offset (exclusive, chars).
    pub end: usize,
    /// Structural category.
    pub partition_type: PartitionType,
    /// Number of open block constructs enclosing this partition.
    ///
    /// An end tag that closes a block reports the depth outside that block, so it matches its
    /// start tag.
    pub nesting_depth: usize,
    /// The construct reached end of document without its closer.
    pub unterminated: bool,
    /// Open blocks at `start`.
    pub(crate) scope: BlockScope,
}

impl Partition {
    /// Create a partition at top level.
    pub fn new(start: usize, end: usize, partition_type: PartitionType) -> Self {
        Self {
            start,
            end,
            partition_type,
            nesting_depth: 0,
            unterminated: false,
            scope: BlockScope::root(),
        }
    }

    /// `start..end`.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for the empty partition of an empty document.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `offset` lies in `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Open blocks at the start of this partition, innermost first.
    pub fn scope(&self) -> &BlockScope {
        &self.scope
    }

    pub(crate) fn shifted(&self, delta: isize) -> Self {
        let mut partition = self.clone();
        partition.start = partition.start.saturating_add_signed(delta);
        partition.end = partition.end.saturating_add_signed(delta);
        partition
    }
}

/// Index of the partition containing `offset`.
///
/// At a boundary the partition starting there wins; an offset at (or past) the document end
/// maps to the last partition. Returns `None` only for an empty list.
pub fn partition_index_at(partitions: &[Partition], offset: usize) -> Option<usize> {
    if partitions.is_empty() {
        return None;
    }
    let idx = partitions.partition_point(|p| p.start <= offset);
    Some(idx.saturating_sub(1))
}

/// The partition containing `offset`; see [`partition_index_at`].
pub fn partition_at(partitions: &[Partition], offset: usize) -> Option<&Partition> {
    partition_index_at(partitions, offset).map(|idx| &partitions[idx])
}

/// Check that `partitions` tile `[0, len)` with no gaps or overlaps.
pub fn validate_tiling(partitions: &[Partition], len: usize) -> Result<()> {
    let broken = |index: usize, detail: String| Err(EngineError::BrokenTiling { index, detail });

    let Some(first) = partitions.first() else {
        return broken(0, "partition list is empty".to_string());
    };
    if first.start != 0 {
        return broken(0, format!("first partition starts at {}", first.start));
    }
    for (idx, partition) in partitions.iter().enumerate() {
        if partition.is_empty() && len != 0 {
            return broken(idx, format!("empty partition at {}", partition.start));
        }
        if partition.end < partition.start {
            return broken(idx, format!("end {} before start {}", partition.end, partition.start));
        }
        if let Some(next) = partitions.get(idx + 1)
            && partition.end != next.start
        {
            return broken(
                idx,
                format!("ends at {} but next starts at {}", partition.end, next.start),
            );
        }
    }
    if let Some(last) = partitions.last()
        && last.end != len
    {
        return broken(
            partitions.len() - 1,
            format!("last partition ends at {} (document length: {len})", last.end),
        );
    }
    Ok(())
}

/// An immutable, versioned `(text, partitions)` pair.
///
/// Published atomically; readers never observe a partition list that belongs to other text.
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
    /// Document version the partitions were computed for.
    pub version: u64,
    /// The text the partitions describe.
    pub text: Rope,
    /// The partition list.
    pub partitions: Arc<[Partition]>,
}

impl PartitionSnapshot {
    /// The partition containing `offset`.
    pub fn partition_at(&self, offset: usize) -> Option<&Partition> {
        partition_at(&self.partitions, offset)
    }

    /// Text of `partition`.
    pub fn text_of(&self, partition: &Partition) -> String {
        self.slice(partition.range())
    }

    /// Text in `range`, clamped to the document.
    pub fn slice(&self, range: Range<usize>) -> String {
        let len = self.text.len_chars();
        let end = range.end.min(len);
        let start = range.start.min(end);
        self.text.slice(start..end).to_string()
    }
}
