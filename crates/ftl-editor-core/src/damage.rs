//! Damage computation.
//!
//! After an edit, the range that needs re-tokenizing is the union of the partition that held
//! the edit start, the partition that held the edit end, and whatever the repairer actually
//! re-derived. Over-reporting is harmless; under-reporting leaves stale colors, so every
//! bound is taken on the generous side.

use crate::delta::{DamageRegion, union_range};
use crate::partition::{Partition, partition_at};
use crate::partitioner::RepairOutcome;
use std::ops::Range;

/// Post-edit range whose tokens must be recomputed.
///
/// `old` is the pre-edit partition list, `repaired` the result of
/// [`repair`](crate::partitioner::repair) for the same `damage`. `len` is the post-edit
/// document length.
pub fn damaged_region(
    old: &[Partition],
    damage: &DamageRegion,
    repaired: &RepairOutcome,
    len: usize,
) -> Range<usize> {
    let mut region = damage.offset..damage.new_end();

    if let Some(first) = partition_at(old, damage.offset) {
        region = union_range(region, damage.map_range(first.range()));
    }
    if let Some(last) = partition_at(old, damage.old_end()) {
        region = union_range(region, damage.map_range(last.range()));
    }
    region = union_range(region, repaired.changed.clone());

    region.start.min(len)..region.end.min(len)
}

/// Indices of the partitions of `partitions` that intersect `range`.
///
/// An empty `range` selects the partition containing its start.
pub fn partitions_in(partitions: &[Partition], range: &Range<usize>) -> Range<usize> {
    let first = partitions
        .partition_point(|p| p.end <= range.start)
        .min(partitions.len().saturating_sub(1));
    let last = partitions.partition_point(|p| p.start < range.end).max(first + 1);
    first..last.min(partitions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DocumentEdit;
    use crate::partitioner::{compute_partitions, repair};
    use ropey::Rope;

    fn damaged(text: &str, edit: DocumentEdit) -> (Range<usize>, String) {
        let mut rope = Rope::from_str(text);
        let old = compute_partitions(&rope);
        rope.remove(edit.offset..edit.removed_end());
        rope.insert(edit.offset, &edit.inserted_text);
        let outcome = repair(&old, &rope, &edit.damage()).unwrap();
        let range = damaged_region(&old, &edit.damage(), &outcome, rope.len_chars());
        let slice = rope.slice(range.clone()).to_string();
        (range, slice)
    }

    #[test]
    fn test_edit_inside_text_damages_that_partition() {
        let (range, slice) = damaged("Hello ${name}!", DocumentEdit::insert(1, "i"));
        assert_eq!(range, 0..7);
        assert_eq!(slice, "Hiello ");
    }

    #[test]
    fn test_edit_inside_interpolation_covers_neighbours_rescanned() {
        let (_, slice) = damaged("Hello ${name}!", DocumentEdit::insert(9, "X"));
        assert!(slice.contains("${nXame}"));
    }

    #[test]
    fn test_edit_spanning_partitions_covers_both() {
        let (range, _) = damaged("ab ${x} cd <#if y>z</#if>", DocumentEdit::delete(5, 7));
        assert_eq!(range.start, 0);
        assert!(range.end >= 11);
    }

    #[test]
    fn test_cascading_damage_reaches_end() {
        let text = "a ${b} c ${d} e";
        let (range, _) = damaged(text, DocumentEdit::insert(2, "<#--"));
        assert_eq!(range.end, text.len() + 4);
    }

    #[test]
    fn test_partitions_in() {
        let parts = compute_partitions(&Rope::from_str("Hello ${name}!"));
        assert_eq!(partitions_in(&parts, &(0..6)), 0..1);
        assert_eq!(partitions_in(&parts, &(5..8)), 0..2);
        assert_eq!(partitions_in(&parts, &(13..13)), 2..3);
        assert_eq!(partitions_in(&parts, &(0..14)), 0..3);
    }
}
