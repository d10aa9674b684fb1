//! Category indices over the sorted frame list
//!
//! Positions refer to the document's time-sorted frame index, never to file
//! offsets. Classification appends positions in ascending order, so every
//! index is sorted and duplicate-free by construction and set operations
//! are linear merges.

use super::Document;
use crate::capture::Frame;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Sorted set of frame positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryIndex {
    positions: Vec<u32>,
}

impl CategoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `position`, which must not be below any position already held
    pub(crate) fn push(&mut self, position: u32) {
        match self.positions.last() {
            Some(&last) if last >= position => {
                if let Err(at) = self.positions.binary_search(&position) {
                    self.positions.insert(at, position);
                }
            }
            _ => self.positions.push(position),
        }
    }

    #[must_use]
    pub fn contains(&self, position: u32) -> bool {
        self.positions.binary_search(&position).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn get(&self, nth: usize) -> Option<u32> {
        self.positions.get(nth).copied()
    }

    /// First held position at or after `position`
    #[must_use]
    pub fn first_at_or_after(&self, position: u32) -> Option<usize> {
        let nth = self.positions.partition_point(|&p| p < position);
        (nth < self.positions.len()).then_some(nth)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.positions.iter().copied()
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.merge(other, true, true, true)
    }

    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        self.merge(other, true, false, false)
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.merge(other, false, false, true)
    }

    /// Walk both sorted lists once, keeping positions only in `self`, only
    /// in `other`, or in both as requested
    fn merge(&self, other: &Self, keep_left: bool, keep_right: bool, keep_both: bool) -> Self {
        let (a, b) = (&self.positions, &other.positions);
        let mut positions = Vec::with_capacity(a.len().max(b.len()));
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => {
                    if keep_left {
                        positions.push(a[i]);
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    if keep_right {
                        positions.push(b[j]);
                    }
                    j += 1;
                }
                Ordering::Equal => {
                    if keep_both {
                        positions.push(a[i]);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        if keep_left {
            positions.extend_from_slice(&a[i..]);
        }
        if keep_right {
            positions.extend_from_slice(&b[j..]);
        }

        Self { positions }
    }
}

impl FromIterator<u32> for CategoryIndex {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut positions: Vec<u32> = iter.into_iter().collect();
        positions.sort_unstable();
        positions.dedup();
        Self { positions }
    }
}

/// One index per record kind plus the derived ones
#[derive(Debug, Clone, Default)]
pub struct Categories {
    pub samples: CategoryIndex,
    pub allocations: CategoryIndex,
    /// Samples and allocations: everything carrying a stack
    pub traceables: CategoryIndex,
    /// Samples whose stack enters the kernel
    pub samples_with_context_switch: CategoryIndex,
    pub processes: CategoryIndex,
    pub memory_maps: CategoryIndex,
    pub marks: CategoryIndex,
    pub counter_definitions: CategoryIndex,
    pub counter_sets: CategoryIndex,
    pub file_chunks: CategoryIndex,
    pub jitmaps: CategoryIndex,
    pub overlays: CategoryIndex,
    pub exits: CategoryIndex,
    pub forks: CategoryIndex,
    pub logs: CategoryIndex,
    pub metadata: CategoryIndex,
    /// Frames with a type tag this engine does not interpret
    pub unknown: CategoryIndex,
}

/// Lazy view of a category: decodes frames only when asked
#[derive(Clone)]
pub struct FrameList<'a> {
    document: &'a Document,
    index: Cow<'a, CategoryIndex>,
}

impl<'a> FrameList<'a> {
    pub(crate) fn new(document: &'a Document, index: Cow<'a, CategoryIndex>) -> Self {
        Self { document, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// `nth` frame of the category in time order
    #[must_use]
    pub fn get(&self, nth: usize) -> Option<Frame<'a>> {
        self.document.frame(self.index.get(nth)?)
    }

    /// Positions into the document's frame index
    #[must_use]
    pub fn index(&self) -> &CategoryIndex {
        &self.index
    }

    /// Decoded frames in time order; frames that fail to decode are skipped
    pub fn iter(&self) -> impl Iterator<Item = Frame<'a>> + '_ {
        let document = self.document;
        self.index.iter().filter_map(move |position| document.frame(position))
    }

    /// Frames paired with their positions
    pub fn iter_positions(&self) -> impl Iterator<Item = (u32, Frame<'a>)> + '_ {
        let document = self.document;
        self.index
            .iter()
            .filter_map(move |position| document.frame(position).map(|frame| (position, frame)))
    }
}

impl std::fmt::Debug for FrameList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameList").field("len", &self.len()).finish()
    }
}
