//! Frame indexer
//!
//! A single forward scan over the mapped capture records the `(offset, len)`
//! of every frame, then the index is ordered by timestamp. Nothing is copied
//! out of the buffer; later stages decode frames on demand from the index.
//!
//! Damaged input never fails the scan. A frame with an implausible length
//! ends indexing at that point and everything before it is kept, because
//! captures from killed recorders are routinely cut mid-record.

use super::endian::ByteOrder;
use super::frame::{mark_duration, FrameHeader};
use crate::domain::Timestamp;
use capscope_common::{CAPTURE_ALIGN, FRAME_HEADER_SIZE, HEADER_SIZE};
use log::warn;
use std::cmp::Reverse;

/// Location of one frame inside the capture buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameIndexEntry {
    pub offset: usize,
    pub len: usize,
}

impl FrameIndexEntry {
    /// The frame's bytes, if the entry lies inside `data`
    #[must_use]
    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.offset..self.offset.checked_add(self.len)?)
    }
}

/// Why the forward scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStop {
    /// Every byte after the header belonged to a frame
    EndOfData,
    /// A frame declared a length below the frame header size or off alignment
    BadLength { offset: usize, len: usize },
    /// A frame claimed more bytes than remain in the file
    Truncated { offset: usize, len: usize },
}

/// Scan `data` from the end of the file header, recording each frame
///
/// The returned entries are in file order.
#[must_use]
pub fn index_frames(data: &[u8], order: ByteOrder) -> (Vec<FrameIndexEntry>, IndexStop) {
    let mut entries = Vec::new();
    let mut pos = HEADER_SIZE;

    while pos < data.len() {
        let Some(len) = order.u16(data, pos).map(usize::from) else {
            warn!("Trailing {} byte(s) at offset {pos} do not form a frame", data.len() - pos);
            return (entries, IndexStop::Truncated { offset: pos, len: data.len() - pos });
        };

        if len < FRAME_HEADER_SIZE || len % CAPTURE_ALIGN != 0 {
            warn!("Frame at offset {pos} has invalid length {len}, stopping index");
            return (entries, IndexStop::BadLength { offset: pos, len });
        }

        if pos + len > data.len() {
            warn!(
                "Frame at offset {pos} needs {len} bytes but only {} remain, stopping index",
                data.len() - pos
            );
            return (entries, IndexStop::Truncated { offset: pos, len });
        }

        entries.push(FrameIndexEntry { offset: pos, len });
        pos += len;
    }

    (entries, IndexStop::EndOfData)
}

/// Order entries by timestamp
///
/// The sort is stable. Among records sharing a timestamp, marks are
/// rearranged within the slots marks already occupy so that the longer mark
/// comes first; an enclosing mark then precedes the marks nested inside it.
pub fn sort_frames(data: &[u8], order: ByteOrder, entries: &mut Vec<FrameIndexEntry>) {
    let mut keyed: Vec<(Timestamp, Option<i64>, FrameIndexEntry)> = entries
        .iter()
        .map(|entry| {
            let bytes = entry.slice(data).unwrap_or_default();
            let time = FrameHeader::parse(bytes, order).map(|h| h.time).unwrap_or_default();
            (time, mark_duration(bytes, order), *entry)
        })
        .collect();

    keyed.sort_by_key(|(time, _, _)| *time);

    let mut start = 0;
    while start < keyed.len() {
        let time = keyed[start].0;
        let end = start + keyed[start..].iter().take_while(|(t, _, _)| *t == time).count();
        order_marks_in_run(&mut keyed[start..end]);
        start = end;
    }

    entries.clear();
    entries.extend(keyed.into_iter().map(|(_, _, entry)| entry));
}

fn order_marks_in_run(run: &mut [(Timestamp, Option<i64>, FrameIndexEntry)]) {
    let slots: Vec<usize> =
        run.iter().enumerate().filter(|(_, k)| k.1.is_some()).map(|(i, _)| i).collect();
    if slots.len() < 2 {
        return;
    }

    let mut marks: Vec<_> = slots.iter().map(|&i| run[i]).collect();
    marks.sort_by_key(|(_, duration, _)| Reverse(duration.unwrap_or_default()));
    for (slot, mark) in slots.into_iter().zip(marks) {
        run[slot] = mark;
    }
}
