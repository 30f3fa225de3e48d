//! Style intervals.
//!
//! The presentation layer keeps the `(range, style)` pairs of the whole document in an
//! [`IntervalTree`], shifts them on every edit and replaces only the damaged range afterwards.

use std::ops::Range;

/// Numeric style handle; hosts map it to colors.
pub type StyleId = u32;

/// Which producer a set of intervals came from, so one can be replaced without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StyleLayerId(pub u32);

impl StyleLayerId {
    /// Wrap a raw layer number.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Partition/token based syntax coloring.
    pub const SYNTAX: Self = Self(1);

    /// Advisory diagnostics overlay (unterminated constructs, unclosed blocks).
    pub const DIAGNOSTICS: Self = Self(2);
}

/// A styled `[start, end)` char range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// First styled char.
    pub start: usize,
    /// One past the last styled char.
    pub end: usize,
    /// Style to apply.
    pub style_id: StyleId,
}

impl Interval {
    /// An interval over `[start, end)`.
    pub fn new(start: usize, end: usize, style_id: StyleId) -> Self {
        Self {
            start,
            end,
            style_id,
        }
    }

    /// The covered range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether `pos` is inside.
    pub fn contains(&self, pos: usize) -> bool {
        self.range().contains(&pos)
    }

    /// Whether the two ranges share at least one char.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Style intervals of one document, ordered by start.
///
/// Backed by a sorted `Vec` plus a running maximum of `end`, which lets point and range
/// queries stop scanning backwards as soon as nothing earlier can reach the query.
#[derive(Debug, Clone, Default)]
pub struct IntervalTree {
    intervals: Vec<Interval>,
    /// `reach[i]` is the largest `end` among `intervals[..=i]`.
    reach: Vec<usize>,
}

impl IntervalTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex(&mut self, from: usize) {
        self.reach.truncate(from);
        let mut max_end = from.checked_sub(1).map_or(0, |i| self.reach[i]);
        for interval in &self.intervals[from..] {
            max_end = max_end.max(interval.end);
            self.reach.push(max_end);
        }
    }

    /// Add one interval.
    pub fn insert(&mut self, interval: Interval) {
        let at = self.intervals.partition_point(|i| i.start <= interval.start);
        self.intervals.insert(at, interval);
        self.reindex(at);
    }

    /// Drop every interval overlapping `[start, end)` and return how many went.
    ///
    /// An empty range drops the intervals containing `start`.
    pub fn remove_range(&mut self, start: usize, end: usize) -> usize {
        let probe = Interval::new(start, end.max(start + 1), 0);
        let before = self.intervals.len();
        self.intervals.retain(|interval| !interval.overlaps(&probe));
        let removed = before - self.intervals.len();
        if removed > 0 {
            self.reindex(0);
        }
        removed
    }

    /// Swap the intervals overlapping `[start, end)` for `intervals`.
    pub fn replace_range(
        &mut self,
        start: usize,
        end: usize,
        intervals: impl IntoIterator<Item = Interval>,
    ) {
        self.remove_range(start, end);
        let at = self.intervals.partition_point(|i| i.start < start);
        let tail = self.intervals.split_off(at);
        self.intervals.extend(intervals);
        self.intervals.extend(tail);
        self.intervals.sort_by_key(|i| i.start);
        self.reindex(at);
    }

    /// Intervals containing `pos`, latest start first.
    pub fn query_point(&self, pos: usize) -> Vec<&Interval> {
        let candidates = self.intervals.partition_point(|i| i.start <= pos);
        let mut found = Vec::new();
        for idx in (0..candidates).rev() {
            if self.reach[idx] <= pos {
                break;
            }
            if self.intervals[idx].contains(pos) {
                found.push(&self.intervals[idx]);
            }
        }
        found
    }

    /// Intervals overlapping `[start, end)`, ordered by start.
    pub fn query_range(&self, start: usize, end: usize) -> Vec<&Interval> {
        if start >= end {
            return Vec::new();
        }
        let stop = self.intervals.partition_point(|i| i.start < end);
        let mut first = self.intervals[..stop].partition_point(|i| i.start < start);
        while first > 0 && self.reach[first - 1] > start {
            first -= 1;
        }
        self.intervals[first..stop]
            .iter()
            .filter(|i| i.end > start)
            .collect()
    }

    /// All intervals, ordered by start.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.intervals.clear();
        self.reach.clear();
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Returns `true` if there are no intervals.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Shift for `delta` chars inserted at `pos`. An interval straddling `pos` grows.
    pub fn update_for_insertion(&mut self, pos: usize, delta: usize) {
        if delta == 0 {
            return;
        }
        for interval in &mut self.intervals {
            if interval.start >= pos {
                interval.start += delta;
            }
            if interval.end > pos {
                interval.end += delta;
            }
        }
        self.reindex(0);
    }

    /// Shift and clip for the deletion of `[start, end)`. Intervals inside it disappear.
    pub fn update_for_deletion(&mut self, start: usize, end: usize) {
        if end <= start {
            return;
        }
        let map = |offset: usize| {
            if offset <= start {
                offset
            } else if offset >= end {
                offset - (end - start)
            } else {
                start
            }
        };
        self.intervals.retain_mut(|interval| {
            interval.start = map(interval.start);
            interval.end = map(interval.end);
            interval.end > interval.start
        });
        self.reindex(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(intervals: &[(usize, usize, StyleId)]) -> IntervalTree {
        let mut tree = IntervalTree::new();
        for &(start, end, style) in intervals {
            tree.insert(Interval::new(start, end, style));
        }
        tree
    }

    fn styles<'a>(intervals: impl IntoIterator<Item = &'a Interval>) -> Vec<StyleId> {
        intervals.into_iter().map(|i| i.style_id).collect()
    }

    #[test]
    fn test_interval_bounds() {
        let interval = Interval::new(4, 8, 1);
        assert!(interval.contains(4) && interval.contains(7));
        assert!(!interval.contains(8));
        assert!(interval.overlaps(&Interval::new(7, 9, 2)));
        assert!(!interval.overlaps(&Interval::new(8, 9, 2)));
    }

    #[test]
    fn test_point_query_on_nested_intervals() {
        // An interpolation span with a string token inside it.
        let tree = tree(&[(0, 6, 1), (6, 20, 2), (9, 14, 3), (20, 22, 1)]);
        assert_eq!(styles(tree.query_point(10)), vec![3, 2]);
        assert_eq!(styles(tree.query_point(20)), vec![1]);
        assert!(tree.query_point(30).is_empty());
    }

    #[test]
    fn test_range_query_reaches_back_to_long_intervals() {
        let tree = tree(&[(0, 50, 9), (10, 12, 1), (20, 22, 2), (40, 42, 3)]);
        assert_eq!(styles(tree.query_range(21, 41)), vec![9, 2, 3]);
        assert_eq!(styles(tree.query_range(12, 20)), vec![9]);
        assert!(tree.query_range(5, 5).is_empty());
    }

    #[test]
    fn test_insertion_grows_straddling_interval() {
        let mut tree = tree(&[(0, 4, 1), (4, 9, 2)]);
        tree.update_for_insertion(6, 3);
        assert_eq!(tree.iter().map(Interval::range).collect::<Vec<_>>(), vec![0..4, 4..12]);
        tree.update_for_insertion(4, 1);
        assert_eq!(tree.iter().map(Interval::range).collect::<Vec<_>>(), vec![0..4, 5..13]);
    }

    #[test]
    fn test_deletion_clips_and_drops() {
        let mut tree = tree(&[(0, 5, 1), (5, 8, 2), (8, 12, 3), (12, 15, 4)]);
        tree.update_for_deletion(3, 10);
        assert_eq!(
            tree.iter().map(|i| (i.range(), i.style_id)).collect::<Vec<_>>(),
            vec![(0..3, 1), (3..5, 3), (5..8, 4)]
        );
        assert_eq!(styles(tree.query_point(4)), vec![3]);
    }

    #[test]
    fn test_replace_range_keeps_order() {
        let mut tree = tree(&[(0, 2, 1), (2, 6, 2), (6, 9, 3)]);
        tree.replace_range(2, 6, vec![Interval::new(2, 4, 7), Interval::new(4, 6, 8)]);
        assert_eq!(styles(tree.iter()), vec![1, 7, 8, 3]);
        assert_eq!(styles(tree.query_point(5)), vec![8]);
    }

    #[test]
    fn test_remove_range() {
        let mut tree = tree(&[(0, 4, 1), (4, 8, 2)]);
        assert_eq!(tree.remove_range(4, 4), 1);
        assert_eq!(styles(tree.iter()), vec![1]);
        assert_eq!(tree.remove_range(0, 10), 1);
        assert!(tree.is_empty());
    }
}
