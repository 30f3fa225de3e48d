//! Edit notifications and damage regions.
//!
//! Hosts report every buffer change as a [`DocumentEdit`] (in edit order, no gaps). The core
//! reduces each edit to a [`DamageRegion`], the length-only description consumed once by the
//! repairer and then discarded.
//!
//! All offsets are **character offsets** (Unicode scalar values).

use std::ops::Range;

/// A single edit notification: `removed_length` chars at `offset` are replaced by `inserted_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEdit {
    /// Start character offset of the edit, in the document before the edit.
    pub offset: usize,
    /// Number of chars removed at `offset`.
    pub removed_length: usize,
    /// Exact inserted text (may be empty).
    pub inserted_text: String,
}

impl DocumentEdit {
    /// Replace `removed_length` chars at `offset` with `text`.
    pub fn new(offset: usize, removed_length: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            removed_length,
            inserted_text: text.into(),
        }
    }

    /// Insert `text` at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, 0, text)
    }

    /// Delete `len` chars at `offset`.
    pub fn delete(offset: usize, len: usize) -> Self {
        Self::new(offset, len, String::new())
    }

    /// Length of `inserted_text` in characters.
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// Exclusive end of the removed range, in the pre-edit document.
    pub fn removed_end(&self) -> usize {
        self.offset.saturating_add(self.removed_length)
    }

    /// Returns `true` if the edit neither removes nor inserts anything.
    pub fn is_noop(&self) -> bool {
        self.removed_length == 0 && self.inserted_text.is_empty()
    }

    /// The damage region described by this edit.
    pub fn damage(&self) -> DamageRegion {
        DamageRegion {
            offset: self.offset,
            original_length: self.removed_length,
            new_length: self.inserted_len(),
        }
    }
}

/// `{offset, original_length, new_length}` describing one applied edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DamageRegion {
    /// Start character offset of the edit.
    pub offset: usize,
    /// Length of the replaced text.
    pub original_length: usize,
    /// Length of the inserted text.
    pub new_length: usize,
}

impl DamageRegion {
    /// Create a damage region.
    pub fn new(offset: usize, original_length: usize, new_length: usize) -> Self {
        Self {
            offset,
            original_length,
            new_length,
        }
    }

    /// Signed change in document length.
    pub fn delta(&self) -> isize {
        self.new_length as isize - self.original_length as isize
    }

    /// End of the replaced text in the pre-edit document.
    pub fn old_end(&self) -> usize {
        self.offset.saturating_add(self.original_length)
    }

    /// End of the inserted text in the post-edit document.
    pub fn new_end(&self) -> usize {
        self.offset.saturating_add(self.new_length)
    }

    /// Map a pre-edit offset into the post-edit document.
    ///
    /// Offsets inside the replaced text collapse onto the edit start.
    pub fn map_start(&self, offset: usize) -> usize {
        if offset <= self.offset {
            offset
        } else if offset >= self.old_end() {
            offset - self.original_length + self.new_length
        } else {
            self.offset
        }
    }

    /// Map a pre-edit offset into the post-edit document.
    ///
    /// Offsets inside the replaced text move to the end of the inserted text.
    pub fn map_end(&self, offset: usize) -> usize {
        if offset < self.offset {
            offset
        } else if offset >= self.old_end() {
            offset - self.original_length + self.new_length
        } else {
            self.new_end()
        }
    }

    /// Map a pre-edit range into the post-edit document, growing it to cover any overlap
    /// with the inserted text.
    pub fn map_range(&self, range: Range<usize>) -> Range<usize> {
        let start = self.map_start(range.start);
        let end = self.map_end(range.end).max(start);
        start..end
    }
}

/// Smallest range covering both `a` and `b`.
pub(crate) fn union_range(a: Range<usize>, b: Range<usize>) -> Range<usize> {
    a.start.min(b.start)..a.end.max(b.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_damage() {
        let edit = DocumentEdit::new(4, 2, "héllo");
        assert_eq!(edit.inserted_len(), 5);
        assert_eq!(edit.removed_end(), 6);
        assert_eq!(edit.damage(), DamageRegion::new(4, 2, 5));
        assert!(DocumentEdit::insert(3, "").is_noop());
    }

    #[test]
    fn test_ends_saturate() {
        let damage = DamageRegion::new(7, usize::MAX, usize::MAX);
        assert_eq!(damage.old_end(), usize::MAX);
        assert_eq!(damage.new_end(), usize::MAX);
        assert_eq!(DocumentEdit::delete(7, usize::MAX).removed_end(), usize::MAX);
    }

    #[test]
    fn test_map_offsets() {
        let damage = DamageRegion::new(10, 4, 1);
        assert_eq!(damage.delta(), -3);
        assert_eq!(damage.map_start(5), 5);
        assert_eq!(damage.map_start(12), 10);
        assert_eq!(damage.map_end(12), 11);
        assert_eq!(damage.map_start(20), 17);
        assert_eq!(damage.map_range(8..12), 8..11);
    }

    #[test]
    fn test_map_range_grows_over_insertion() {
        let damage = DamageRegion::new(3, 0, 4);
        assert_eq!(damage.map_range(0..2), 0..2);
        assert_eq!(damage.map_range(0..3), 0..7);
        assert_eq!(damage.map_range(0..5), 0..9);
        assert_eq!(damage.map_range(3..3), 3..7);
    }
}
