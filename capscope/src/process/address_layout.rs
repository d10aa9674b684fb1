//! Memory ranges of a process's address space
//!
//! Built from map records in the capture rather than from a live
//! `/proc/<pid>/maps`, so it reflects the process as it was recorded.

use crate::domain::Timestamp;
use std::sync::Arc;

/// A file mapped into a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    pub start: u64,
    pub end: u64,
    /// Offset of `start` within the mapped file
    pub offset: u64,
    pub inode: u64,
    pub file: Arc<str>,
    pub time: Timestamp,
}

impl MemoryMap {
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    /// Offset of `address` within the mapped file
    #[must_use]
    pub fn file_offset(&self, address: u64) -> u64 {
        address.wrapping_sub(self.start).wrapping_add(self.offset)
    }

    fn overlaps_start_of(&self, next: &MemoryMap) -> bool {
        self.start <= next.start && self.end > next.start
    }
}

/// Sorted, non-overlapping set of mappings with address lookup
#[derive(Debug, Clone, Default)]
pub struct AddressLayout {
    maps: Vec<MemoryMap>,
    dirty: bool,
}

impl AddressLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, map: MemoryMap) {
        self.maps.push(map);
        self.dirty = true;
    }

    /// Sort by range and drop any mapping overlapped by its successor
    ///
    /// The successor is usually the larger one, e.g. a grown `[stack]`.
    pub fn sort(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.maps.sort_by_key(|map| (map.start, map.end));

        let mut keep = vec![true; self.maps.len()];
        for (i, pair) in self.maps.windows(2).enumerate() {
            if pair[0].overlaps_start_of(&pair[1]) {
                keep[i] = false;
            }
        }
        let mut keep = keep.into_iter();
        self.maps.retain(|_| keep.next().unwrap_or(true));
    }

    /// Mapping containing `address`
    ///
    /// Only meaningful after [`sort`](Self::sort); the loader sorts every
    /// layout before the document is published.
    #[must_use]
    pub fn lookup(&self, address: u64) -> Option<&MemoryMap> {
        let after = self.maps.partition_point(|map| map.start <= address);
        let map = self.maps.get(after.checked_sub(1)?)?;
        map.contains(address).then_some(map)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryMap> {
        self.maps.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
