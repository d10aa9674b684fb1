//! # Document
//!
//! A loaded capture: the mapped bytes, the time-sorted frame index, the
//! category indices, the process table and the reconstructed counters.
//! Loading happens once, on a blocking worker; after that the document is
//! read-only except for a single assignment of the symbol table.
//!
//! ```text
//!  ┌──────────┐  open()   ┌─────────────────────────────────────────────┐
//!  │ .syscap  │──────────►│ header ─► index ─► sort ─► classify         │
//!  └──────────┘   mmap    │   ─► mounts ─► mountinfo ─► cpus ─► maps    │
//!                         │   ─► processes ─► overlays ─► counters      │
//!                         └──────────────────────┬──────────────────────┘
//!                                                ▼
//!                                    Document (read-only)
//!                                                │ symbolize()
//!                                                ▼
//!                                 OnceLock<SymbolTable> assigned once
//! ```
//!
//! Frames are never copied out of the mapping. Category views decode them
//! on demand from their positions in the sorted index.

pub mod counters;
pub mod cpus;
pub mod file;
pub mod index;
pub mod loader;
pub mod marks;
pub mod symbolize;

pub use counters::{Counter, TimedValue};
pub use cpus::CpuInfo;
pub use file::DocumentFile;
pub use index::{Categories, CategoryIndex, FrameList};
pub use marks::{MarkCatalog, MarkGroup};

use crate::capture::{ByteOrder, CaptureHeader, Frame, FrameIndexEntry, IndexStop};
use crate::domain::{Pid, Tid, Timestamp};
use crate::process::{ProcessInfo, ProcessTable};
use crate::strings::StringPool;
use crate::symbols::{Symbol, SymbolTable};
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// Backing storage for a capture
pub enum CaptureData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for CaptureData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            CaptureData::Mapped(map) => map,
            CaptureData::Owned(bytes) => bytes,
        }
    }
}

impl std::fmt::Debug for CaptureData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            CaptureData::Mapped(_) => "Mapped",
            CaptureData::Owned(_) => "Owned",
        };
        write!(f, "{kind}({} bytes)", self.len())
    }
}

/// Recording interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpan {
    pub begin: Timestamp,
    pub end: Timestamp,
}

impl TimeSpan {
    #[must_use]
    pub fn duration_nanos(&self) -> i64 {
        self.end.since(self.begin)
    }

    #[must_use]
    pub fn contains(&self, time: Timestamp) -> bool {
        time >= self.begin && time <= self.end
    }
}

/// An indexed capture
pub struct Document {
    data: CaptureData,
    header: CaptureHeader,
    frames: Vec<FrameIndexEntry>,
    index_stop: IndexStop,
    categories: Categories,
    pids: BTreeSet<Pid>,
    /// group → name → mark positions
    mark_groups: BTreeMap<String, BTreeMap<String, CategoryIndex>>,
    /// Virtual file path (as recorded, `.gz` included) → first chunk position
    files: HashMap<String, u32>,
    processes: ProcessTable,
    counters: Vec<Counter>,
    cpus: Vec<CpuInfo>,
    time_span: TimeSpan,
    strings: Arc<StringPool>,
    symbols: OnceLock<SymbolTable>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("data", &self.data)
            .field("frames", &self.frames.len())
            .field("processes", &self.processes.len())
            .field("counters", &self.counters.len())
            .field("symbolized", &self.symbols.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Decode the frame at `position` of a sorted index
fn decode_at<'a>(
    data: &'a [u8],
    frames: &[FrameIndexEntry],
    order: ByteOrder,
    position: u32,
) -> Option<Frame<'a>> {
    let entry = frames.get(usize::try_from(position).ok()?)?;
    Frame::decode(entry.slice(data)?, order)
}

impl Document {
    // ========================================================================
    // Capture
    // ========================================================================

    #[must_use]
    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Recording interval; the end is extended to the last recorded activity
    #[must_use]
    pub fn time_span(&self) -> TimeSpan {
        self.time_span
    }

    /// Clock value when recording started
    #[must_use]
    pub fn clock_at_start(&self) -> Timestamp {
        self.header.time
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// True when the capture was written on a host with this byte order
    #[must_use]
    pub fn is_native(&self) -> bool {
        !self.header.needs_swap()
    }

    /// Why frame indexing ended
    #[must_use]
    pub fn index_stop(&self) -> IndexStop {
        self.index_stop
    }

    /// Number of indexed frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `position` in time order
    #[must_use]
    pub fn frame(&self, position: u32) -> Option<Frame<'_>> {
        decode_at(&self.data, &self.frames, self.header.byte_order, position)
    }

    /// Every frame in time order
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> {
        let order = self.header.byte_order;
        self.frames
            .iter()
            .filter_map(move |entry| Frame::decode(entry.slice(&self.data)?, order))
    }

    #[must_use]
    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }

    // ========================================================================
    // Categories
    // ========================================================================

    #[must_use]
    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    /// View any index over this document's frames
    #[must_use]
    pub fn view<'a>(&'a self, index: &'a CategoryIndex) -> FrameList<'a> {
        FrameList::new(self, Cow::Borrowed(index))
    }

    #[must_use]
    pub fn samples(&self) -> FrameList<'_> {
        self.view(&self.categories.samples)
    }

    #[must_use]
    pub fn allocations(&self) -> FrameList<'_> {
        self.view(&self.categories.allocations)
    }

    /// Samples and allocations in time order
    #[must_use]
    pub fn traceables(&self) -> FrameList<'_> {
        self.view(&self.categories.traceables)
    }

    #[must_use]
    pub fn samples_with_context_switch(&self) -> FrameList<'_> {
        self.view(&self.categories.samples_with_context_switch)
    }

    #[must_use]
    pub fn samples_without_context_switch(&self) -> FrameList<'_> {
        let index =
            self.categories.samples.subtract(&self.categories.samples_with_context_switch);
        FrameList::new(self, Cow::Owned(index))
    }

    /// Process records, first record per pid only
    #[must_use]
    pub fn process_records(&self) -> FrameList<'_> {
        self.view(&self.categories.processes)
    }

    #[must_use]
    pub fn memory_maps(&self) -> FrameList<'_> {
        self.view(&self.categories.memory_maps)
    }

    #[must_use]
    pub fn marks(&self) -> FrameList<'_> {
        self.view(&self.categories.marks)
    }

    #[must_use]
    pub fn counter_definitions(&self) -> FrameList<'_> {
        self.view(&self.categories.counter_definitions)
    }

    #[must_use]
    pub fn counter_sets(&self) -> FrameList<'_> {
        self.view(&self.categories.counter_sets)
    }

    #[must_use]
    pub fn file_chunks(&self) -> FrameList<'_> {
        self.view(&self.categories.file_chunks)
    }

    #[must_use]
    pub fn jitmaps(&self) -> FrameList<'_> {
        self.view(&self.categories.jitmaps)
    }

    #[must_use]
    pub fn overlays(&self) -> FrameList<'_> {
        self.view(&self.categories.overlays)
    }

    #[must_use]
    pub fn exits(&self) -> FrameList<'_> {
        self.view(&self.categories.exits)
    }

    #[must_use]
    pub fn forks(&self) -> FrameList<'_> {
        self.view(&self.categories.forks)
    }

    #[must_use]
    pub fn logs(&self) -> FrameList<'_> {
        self.view(&self.categories.logs)
    }

    #[must_use]
    pub fn metadata(&self) -> FrameList<'_> {
        self.view(&self.categories.metadata)
    }

    /// Every non-negative pid seen in a frame header
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    // ========================================================================
    // Processes
    // ========================================================================

    #[must_use]
    pub fn process_info(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.processes.get(pid)
    }

    /// Processes in ascending pid order
    pub fn list_processes(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.processes.iter()
    }

    /// Symbol naming `pid`; negative pids name the kernel
    #[must_use]
    pub fn process_symbol(&self, pid: Pid) -> Option<&Symbol> {
        let pid = if pid.is_valid() { pid } else { Pid::KERNEL };
        self.processes.get(pid).map(ProcessInfo::symbol)
    }

    #[must_use]
    pub fn thread_symbol(&self, pid: Pid, tid: Tid) -> Option<Symbol> {
        Some(self.processes.get(pid)?.thread_symbol(&self.strings, tid))
    }
}
