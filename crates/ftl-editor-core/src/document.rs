//! The edited text plus its edit counter.

use crate::delta::{DamageRegion, DocumentEdit};
use crate::error::{EngineError, Result};
use ropey::Rope;

/// Mutable text with a monotonically increasing edit counter.
///
/// The rope is cheap to clone, so readers get a consistent snapshot with [`Document::text`]
/// and `Rope::clone`.
#[derive(Debug, Clone, Default)]
pub struct Document {
    rope: Rope,
    version: u64,
}

impl Document {
    /// Create a document holding `text` at version 0.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
        }
    }

    /// Current text.
    pub fn text(&self) -> &Rope {
        &self.rope
    }

    /// Length in chars.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Returns `true` if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Edit counter; bumped once per applied edit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Text in `[start, end)`, clamped to the document.
    pub fn slice_to_string(&self, start: usize, end: usize) -> String {
        let len = self.rope.len_chars();
        let end = end.min(len);
        let start = start.min(end);
        self.rope.slice(start..end).to_string()
    }

    /// Apply an edit notification.
    ///
    /// An edit that addresses text outside the document is a contract violation and fails
    /// without touching the text.
    pub fn apply(&mut self, edit: &DocumentEdit) -> Result<DamageRegion> {
        let len = self.rope.len_chars();
        if edit.offset > len || edit.removed_end() > len {
            tracing::error!(
                offset = edit.offset,
                removed = edit.removed_length,
                len,
                "edit outside document bounds"
            );
            return Err(EngineError::EditOutOfBounds {
                offset: edit.offset,
                removed: edit.removed_length,
                len,
            });
        }

        if edit.removed_length > 0 {
            self.rope.remove(edit.offset..edit.removed_end());
        }
        if !edit.inserted_text.is_empty() {
            self.rope.insert(edit.offset, &edit.inserted_text);
        }
        self.version += 1;
        Ok(edit.damage())
    }

    /// Replace the whole text, bumping the version.
    pub fn set_text(&mut self, text: &str) -> DamageRegion {
        let original_length = self.rope.len_chars();
        self.rope = Rope::from_str(text);
        self.version += 1;
        DamageRegion::new(0, original_length, self.rope.len_chars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_and_bumps_version() {
        let mut doc = Document::new("Hello ${name}!");
        let damage = doc.apply(&DocumentEdit::new(8, 4, "user")).unwrap();
        assert_eq!(damage, DamageRegion::new(8, 4, 4));
        assert_eq!(doc.text().to_string(), "Hello ${user}!");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_apply_out_of_bounds_fails_fast() {
        let mut doc = Document::new("abc");
        let err = doc.apply(&DocumentEdit::delete(2, 5)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EditOutOfBounds {
                offset: 2,
                removed: 5,
                len: 3
            }
        ));
        assert_eq!(doc.text().to_string(), "abc");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_char_offsets() {
        let mut doc = Document::new("été");
        doc.apply(&DocumentEdit::insert(3, "!")).unwrap();
        assert_eq!(doc.slice_to_string(2, 10), "é!");
        assert_eq!(doc.len_chars(), 4);
    }
}
