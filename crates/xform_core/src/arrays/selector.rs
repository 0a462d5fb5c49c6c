use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use xform_error::{DbError, Result};

/// A 0-based row position within a batch, as seen by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalIndex(pub usize);

/// An index into an array's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalIndex(pub usize);

/// Describes which rows of a backing array are in view, and in what order.
///
/// Selectors never copy data. Filtering and remapping produce new selectors
/// over the same backing array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    kind: SelectorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectorKind {
    /// Contiguous rows `[start, end)`.
    Range { start: usize, end: usize },
    /// `count` rows all pointing at the same physical index.
    Single { index: usize, count: usize },
    /// Rows `[start, end)` of an explicit index list.
    Indices {
        indices: Arc<Vec<usize>>,
        start: usize,
        end: usize,
    },
}

impl Selector {
    /// Select all rows `[0, count)`.
    pub const fn all(count: usize) -> Self {
        Selector {
            kind: SelectorKind::Range {
                start: 0,
                end: count,
            },
        }
    }

    pub const fn empty() -> Self {
        Self::all(0)
    }

    /// Select contiguous rows `[start, end)`.
    ///
    /// Panics if `start > end`.
    pub fn range(start: usize, end: usize) -> Self {
        assert!(start <= end, "invalid selector range {start}..{end}");
        Selector {
            kind: SelectorKind::Range { start, end },
        }
    }

    /// Select the value at physical index 0 `count` times.
    pub const fn single(count: usize) -> Self {
        Self::repeated(0, count)
    }

    pub const fn repeated(index: usize, count: usize) -> Self {
        Selector {
            kind: SelectorKind::Single { index, count },
        }
    }

    /// Select the rows named by an explicit list of physical indices.
    pub fn indices(indices: impl Into<Arc<Vec<usize>>>) -> Self {
        let indices = indices.into();
        let end = indices.len();
        Selector {
            kind: SelectorKind::Indices {
                indices,
                start: 0,
                end,
            },
        }
    }

    /// Number of logical rows in view.
    pub fn len(&self) -> usize {
        match &self.kind {
            SelectorKind::Range { start, end } => end - start,
            SelectorKind::Single { count, .. } => *count,
            SelectorKind::Indices { start, end, .. } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the contiguous physical range if this selector is a range.
    pub fn as_range(&self) -> Option<Range<usize>> {
        match &self.kind {
            SelectorKind::Range { start, end } => Some(*start..*end),
            _ => None,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self.kind, SelectorKind::Single { .. })
    }

    /// Map a logical row to its physical index.
    #[inline]
    pub fn index(&self, idx: LogicalIndex) -> PhysicalIndex {
        debug_assert!(idx.0 < self.len(), "logical index {} out of bounds", idx.0);
        let physical = match &self.kind {
            SelectorKind::Range { start, .. } => start + idx.0,
            SelectorKind::Single { index, .. } => *index,
            SelectorKind::Indices { indices, start, .. } => indices[start + idx.0],
        };
        PhysicalIndex(physical)
    }

    /// Iterate the physical indices in logical order.
    pub fn iter(&self) -> SelectorIter<'_> {
        SelectorIter {
            selector: self,
            idx: 0,
            len: self.len(),
        }
    }

    /// Restrict this selector to logical rows `[range.start, range.end)`.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(DbError::new("Slice out of bounds for selector")
                .with_field("slice", format!("{}..{}", range.start, range.end))
                .with_field("len", self.len()));
        }

        let kind = match &self.kind {
            SelectorKind::Range { start, .. } => SelectorKind::Range {
                start: start + range.start,
                end: start + range.end,
            },
            SelectorKind::Single { index, .. } => SelectorKind::Single {
                index: *index,
                count: range.len(),
            },
            SelectorKind::Indices { indices, start, .. } => SelectorKind::Indices {
                indices: indices.clone(),
                start: start + range.start,
                end: start + range.end,
            },
        };

        Ok(Selector { kind })
    }

    /// Write the physical indices for the given logical rows into `out`.
    ///
    /// `out` is cleared first.
    ///
    /// OUT[IDX] = SELF[ROWS[IDX]]
    pub fn select_into(&self, rows: &[LogicalIndex], out: &mut Vec<usize>) {
        out.clear();
        out.extend(rows.iter().map(|row| self.index(*row).0));
    }

    /// Advance to the next page of at most `desired` rows over a domain of
    /// `domain_size` rows.
    ///
    /// The returned selector starts where this one ends. An empty selector
    /// means the domain is exhausted; callers that want to cycle start over
    /// from `Selector::first_page`.
    pub fn next_page(&self, domain_size: usize, desired: usize) -> Self {
        match &self.kind {
            SelectorKind::Range { end, .. } => {
                let start = usize::min(*end, domain_size);
                let end = usize::min(start.saturating_add(desired), domain_size);
                Selector::range(start, end)
            }
            SelectorKind::Indices { indices, end, .. } => {
                let domain_size = usize::min(domain_size, indices.len());
                let start = usize::min(*end, domain_size);
                let end = usize::min(start.saturating_add(desired), domain_size);
                Selector {
                    kind: SelectorKind::Indices {
                        indices: indices.clone(),
                        start,
                        end,
                    },
                }
            }
            // A constant selector is its own single page.
            SelectorKind::Single { index, .. } => Selector::repeated(*index, 0),
        }
    }

    /// The first page over a domain.
    pub fn first_page(domain_size: usize, desired: usize) -> Self {
        Selector::range(0, usize::min(desired, domain_size))
    }

    /// Check that every physical index in view falls within `domain_size`.
    pub fn validate(&self, domain_size: usize) -> Result<()> {
        let max = match &self.kind {
            SelectorKind::Range { start, end } => {
                if start == end {
                    return Ok(());
                }
                end - 1
            }
            SelectorKind::Single { index, count } => {
                if *count == 0 {
                    return Ok(());
                }
                *index
            }
            SelectorKind::Indices {
                indices,
                start,
                end,
            } => match indices[*start..*end].iter().max() {
                Some(max) => *max,
                None => return Ok(()),
            },
        };

        if max >= domain_size {
            return Err(DbError::new("Selector references rows outside of its array")
                .with_field("index", max)
                .with_field("len", domain_size));
        }

        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SelectorKind::Range { start, end } => write!(f, "[{start}, {end})"),
            SelectorKind::Single { index, count } => write!(f, "[{index}; {count}]"),
            SelectorKind::Indices { start, end, .. } => write!(f, "indices[{start}, {end})"),
        }
    }
}

#[derive(Debug)]
pub struct SelectorIter<'a> {
    selector: &'a Selector,
    idx: usize,
    len: usize,
}

impl Iterator for SelectorIter<'_> {
    type Item = PhysicalIndex;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.len {
            return None;
        }
        let v = self.selector.index(LogicalIndex(self.idx));
        self.idx += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = self.len - self.idx;
        (rem, Some(rem))
    }
}

impl ExactSizeIterator for SelectorIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn physical(selector: &Selector) -> Vec<usize> {
        selector.iter().map(|idx| idx.0).collect()
    }

    #[test]
    fn range_index() {
        let sel = Selector::range(5, 8);
        assert_eq!(3, sel.len());
        assert_eq!(vec![5, 6, 7], physical(&sel));
    }

    #[test]
    fn single_repeats() {
        let sel = Selector::single(4);
        assert_eq!(vec![0, 0, 0, 0], physical(&sel));
    }

    #[test]
    fn slice_matches_sub_sequence() {
        let selectors = [
            Selector::range(3, 11),
            Selector::indices(vec![9, 2, 2, 7, 0, 4, 1, 8]),
            Selector::repeated(3, 8),
        ];

        for sel in &selectors {
            let all = physical(sel);
            for start in 0..=sel.len() {
                for end in start..=sel.len() {
                    let sliced = sel.slice(start..end).unwrap();
                    assert_eq!(&all[start..end], physical(&sliced).as_slice());
                }
            }
        }
    }

    #[test]
    fn slice_out_of_bounds() {
        let sel = Selector::all(4);
        sel.slice(2..5).unwrap_err();
    }

    #[test]
    fn slice_of_slice() {
        let sel = Selector::indices(vec![10, 11, 12, 13, 14]);
        let sliced = sel.slice(1..4).unwrap().slice(1..3).unwrap();
        assert_eq!(vec![12, 13], physical(&sliced));
    }

    #[test]
    fn select_into_composes() {
        // 0 => 4, 1 => 5, 2 => 6, 3 => 10, 4 => 11
        let sel = Selector::indices(vec![4, 5, 6, 10, 11]);
        let mut out = Vec::new();
        sel.select_into(&[LogicalIndex(1), LogicalIndex(2), LogicalIndex(4)], &mut out);
        assert_eq!(vec![5, 6, 11], out);
    }

    #[test]
    fn paging_through_domain() {
        let mut sel = Selector::empty();
        let mut pages = Vec::new();
        loop {
            sel = sel.next_page(25, 10);
            if sel.is_empty() {
                break;
            }
            pages.push(sel.as_range().unwrap());
        }
        assert_eq!(vec![0..10, 10..20, 20..25], pages);
    }

    #[test]
    fn first_page_after_wrap() {
        let sel = Selector::range(20, 25).next_page(25, 10);
        assert!(sel.is_empty());
        assert_eq!(Selector::range(0, 10), Selector::first_page(25, 10));
    }

    #[test]
    fn equality_by_value() {
        let a = Selector::indices(vec![1, 2, 3]);
        let b = Selector::indices(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, Selector::range(1, 4));
        assert_ne!(Selector::range(0, 10), Selector::range(10, 20));
    }

    #[test]
    fn validate_bounds() {
        Selector::indices(vec![0, 3]).validate(4).unwrap();
        Selector::indices(vec![0, 4]).validate(4).unwrap_err();
        Selector::range(0, 5).validate(4).unwrap_err();
        Selector::empty().validate(0).unwrap();
    }
}
