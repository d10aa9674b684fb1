//! Typed, bounds-checked decoding of capture frames
//!
//! A frame is decoded from exactly the slice the indexer recorded for it.
//! Every field read is checked against that slice, so a record whose body
//! disagrees with its declared length decodes to `None` instead of reading
//! into its neighbour.

use super::endian::{array, field_str, native_f64, native_i64, tail_str, ByteOrder};
use crate::domain::{Pid, Tid, Timestamp};
use capscope_common::{frame as fh, record, FRAME_HEADER_SIZE};
use std::borrow::Cow;
use std::fmt;

// ============================================================================
// Frame Types
// ============================================================================

/// Record type tag carried in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameType {
    Timestamp,
    Sample,
    Map,
    Process,
    Fork,
    Exit,
    Jitmap,
    CounterDefine,
    CounterSet,
    Mark,
    Metadata,
    Log,
    FileChunk,
    Allocation,
    Overlay,
}

impl FrameType {
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            fh::TYPE_TIMESTAMP => Self::Timestamp,
            fh::TYPE_SAMPLE => Self::Sample,
            fh::TYPE_MAP => Self::Map,
            fh::TYPE_PROCESS => Self::Process,
            fh::TYPE_FORK => Self::Fork,
            fh::TYPE_EXIT => Self::Exit,
            fh::TYPE_JITMAP => Self::Jitmap,
            fh::TYPE_CTRDEF => Self::CounterDefine,
            fh::TYPE_CTRSET => Self::CounterSet,
            fh::TYPE_MARK => Self::Mark,
            fh::TYPE_METADATA => Self::Metadata,
            fh::TYPE_LOG => Self::Log,
            fh::TYPE_FILE_CHUNK => Self::FileChunk,
            fh::TYPE_ALLOCATION => Self::Allocation,
            fh::TYPE_OVERLAY => Self::Overlay,
            _ => return None,
        })
    }

    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Timestamp => fh::TYPE_TIMESTAMP,
            Self::Sample => fh::TYPE_SAMPLE,
            Self::Map => fh::TYPE_MAP,
            Self::Process => fh::TYPE_PROCESS,
            Self::Fork => fh::TYPE_FORK,
            Self::Exit => fh::TYPE_EXIT,
            Self::Jitmap => fh::TYPE_JITMAP,
            Self::CounterDefine => fh::TYPE_CTRDEF,
            Self::CounterSet => fh::TYPE_CTRSET,
            Self::Mark => fh::TYPE_MARK,
            Self::Metadata => fh::TYPE_METADATA,
            Self::Log => fh::TYPE_LOG,
            Self::FileChunk => fh::TYPE_FILE_CHUNK,
            Self::Allocation => fh::TYPE_ALLOCATION,
            Self::Overlay => fh::TYPE_OVERLAY,
        }
    }

    /// Record types whose timestamp says something about recording activity
    ///
    /// Used to guess the end of a capture whose header was never finalized.
    #[must_use]
    pub fn carries_state(self) -> bool {
        matches!(
            self,
            Self::Allocation
                | Self::CounterSet
                | Self::Exit
                | Self::Fork
                | Self::Log
                | Self::Map
                | Self::Mark
                | Self::Process
                | Self::Sample
        )
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timestamp => "timestamp",
            Self::Sample => "sample",
            Self::Map => "map",
            Self::Process => "process",
            Self::Fork => "fork",
            Self::Exit => "exit",
            Self::Jitmap => "jitmap",
            Self::CounterDefine => "counter-define",
            Self::CounterSet => "counter-set",
            Self::Mark => "mark",
            Self::Metadata => "metadata",
            Self::Log => "log",
            Self::FileChunk => "file-chunk",
            Self::Allocation => "allocation",
            Self::Overlay => "overlay",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame Header
// ============================================================================

/// The 24-byte header common to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub len: u16,
    pub cpu: i16,
    pub pid: Pid,
    pub time: Timestamp,
    pub tag: u8,
}

impl FrameHeader {
    #[must_use]
    pub fn parse(data: &[u8], order: ByteOrder) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            len: order.u16(data, fh::LEN)?,
            cpu: order.i16(data, fh::CPU)?,
            pid: Pid(order.i32(data, fh::PID)?),
            time: Timestamp(order.i64(data, fh::TIME)?),
            tag: data[fh::TYPE],
        })
    }

    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_tag(self.tag)
    }
}

// ============================================================================
// Record Bodies
// ============================================================================

/// A stack of instruction pointers, innermost first
#[derive(Clone, Copy)]
pub struct Addresses<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Addresses<'a> {
    fn decode(data: &'a [u8], offset: usize, count: u16, order: ByteOrder) -> Option<Self> {
        let end = offset.checked_add(usize::from(count) * 8)?;
        Some(Self { data: data.get(offset..end)?, order })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / 8
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<u64> {
        self.order.u64(self.data, index.checked_mul(8)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + 'a {
        let (data, order): (&'a [u8], _) = (self.data, self.order);
        data.chunks_exact(8).filter_map(move |chunk| order.u64(chunk, 0))
    }
}

impl fmt::Debug for Addresses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|a| format!("0x{a:x}"))).finish()
    }
}

#[derive(Debug, Clone)]
pub struct SampleRecord<'a> {
    pub tid: Tid,
    pub addresses: Addresses<'a>,
}

#[derive(Debug, Clone)]
pub struct AllocationRecord<'a> {
    pub address: u64,
    /// Bytes allocated; negative for a release
    pub size: i64,
    pub tid: Tid,
    pub addresses: Addresses<'a>,
}

#[derive(Debug, Clone)]
pub struct MapRecord<'a> {
    pub start: u64,
    pub end: u64,
    pub offset: u64,
    pub inode: u64,
    pub file: Cow<'a, str>,
}

#[derive(Debug, Clone)]
pub struct ProcessRecord<'a> {
    pub command_line: Cow<'a, str>,
}

#[derive(Debug, Clone)]
pub struct JitmapRecord<'a> {
    pub entries: Vec<(u64, Cow<'a, str>)>,
}

/// Storage type of a counter's values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterType {
    Int64,
    Double,
}

/// One counter reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterValue {
    Int64(i64),
    Double(f64),
}

impl CounterValue {
    /// Interpret eight raw bytes from a counter record
    ///
    /// Integers are byte-swapped when `swap` is set. Doubles are stored in
    /// the producer's native order and are never swapped.
    #[must_use]
    pub fn from_raw(raw: [u8; 8], counter_type: CounterType, swap: bool) -> Self {
        match counter_type {
            CounterType::Int64 => {
                let value = native_i64(&raw);
                CounterValue::Int64(if swap { value.swap_bytes() } else { value })
            }
            CounterType::Double => CounterValue::Double(native_f64(&raw)),
        }
    }

    #[must_use]
    pub fn counter_type(self) -> CounterType {
        match self {
            CounterValue::Int64(_) => CounterType::Int64,
            CounterValue::Double(_) => CounterType::Double,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            CounterValue::Int64(v) => v as f64,
            CounterValue::Double(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterDefinition<'a> {
    pub id: u32,
    pub counter_type: CounterType,
    pub category: Cow<'a, str>,
    pub name: Cow<'a, str>,
    pub description: Cow<'a, str>,
    /// Initial value, raw as stored in the file
    pub value: [u8; 8],
}

#[derive(Debug, Clone)]
pub struct CounterDefineRecord<'a> {
    pub counters: Vec<CounterDefinition<'a>>,
}

#[derive(Debug, Clone)]
pub struct CounterSetRecord {
    /// `(counter id, raw value)` for every occupied slot
    pub values: Vec<(u32, [u8; 8])>,
}

#[derive(Debug, Clone)]
pub struct MarkRecord<'a> {
    pub duration: i64,
    pub group: Cow<'a, str>,
    pub name: Cow<'a, str>,
    pub message: Cow<'a, str>,
}

#[derive(Debug, Clone)]
pub struct MetadataRecord<'a> {
    pub id: Cow<'a, str>,
    pub data: Cow<'a, str>,
}

#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub severity: u16,
    pub domain: Cow<'a, str>,
    pub message: Cow<'a, str>,
}

#[derive(Debug, Clone)]
pub struct FileChunkRecord<'a> {
    pub path: Cow<'a, str>,
    /// False when the path field had no NUL inside its bounds
    pub path_terminated: bool,
    pub is_last: bool,
    pub data: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct OverlayRecord<'a> {
    pub layer: u8,
    /// Host directory providing the content
    pub source: Cow<'a, str>,
    /// Where the content appears inside the process
    pub destination: Cow<'a, str>,
}

/// Decoded body of a frame
#[derive(Debug, Clone)]
pub enum Record<'a> {
    Timestamp,
    Sample(SampleRecord<'a>),
    Map(MapRecord<'a>),
    Process(ProcessRecord<'a>),
    Fork { child_pid: Pid },
    Exit,
    Jitmap(JitmapRecord<'a>),
    CounterDefine(CounterDefineRecord<'a>),
    CounterSet(CounterSetRecord),
    Mark(MarkRecord<'a>),
    Metadata(MetadataRecord<'a>),
    Log(LogRecord<'a>),
    FileChunk(FileChunkRecord<'a>),
    Allocation(AllocationRecord<'a>),
    Overlay(OverlayRecord<'a>),
    /// A type tag this engine does not interpret
    Unknown(u8),
}

/// A frame header together with its decoded body
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub record: Record<'a>,
}

impl<'a> Frame<'a> {
    /// Decode the frame occupying exactly `data`
    ///
    /// Returns `None` when the body does not fit inside `data`.
    #[must_use]
    pub fn decode(data: &'a [u8], order: ByteOrder) -> Option<Self> {
        let header = FrameHeader::parse(data, order)?;
        let record = match header.frame_type() {
            None => Record::Unknown(header.tag),
            Some(FrameType::Timestamp) => Record::Timestamp,
            Some(FrameType::Exit) => Record::Exit,
            Some(FrameType::Sample) => Record::Sample(decode_sample(data, order)?),
            Some(FrameType::Allocation) => Record::Allocation(decode_allocation(data, order)?),
            Some(FrameType::Map) => Record::Map(decode_map(data, order)?),
            Some(FrameType::Process) => Record::Process(ProcessRecord {
                command_line: tail_str(data, record::process::CMDLINE)?,
            }),
            Some(FrameType::Fork) => {
                Record::Fork { child_pid: Pid(order.i32(data, record::fork::CHILD_PID)?) }
            }
            Some(FrameType::Jitmap) => Record::Jitmap(decode_jitmap(data, order)?),
            Some(FrameType::CounterDefine) => Record::CounterDefine(decode_ctrdef(data, order)?),
            Some(FrameType::CounterSet) => Record::CounterSet(decode_ctrset(data, order)?),
            Some(FrameType::Mark) => Record::Mark(decode_mark(data, order)?),
            Some(FrameType::Metadata) => Record::Metadata(MetadataRecord {
                id: field_str(data, record::metadata::ID, record::metadata::ID_LEN)?,
                data: tail_str(data, record::metadata::DATA)?,
            }),
            Some(FrameType::Log) => Record::Log(LogRecord {
                severity: order.u16(data, record::log::SEVERITY)?,
                domain: field_str(data, record::log::DOMAIN, record::log::DOMAIN_LEN)?,
                message: tail_str(data, record::log::MESSAGE)?,
            }),
            Some(FrameType::FileChunk) => Record::FileChunk(decode_file_chunk(data, order)?),
            Some(FrameType::Overlay) => Record::Overlay(decode_overlay(data, order)?),
        };
        Some(Self { header, record })
    }

    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        self.header.frame_type()
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.header.pid
    }

    #[must_use]
    pub fn time(&self) -> Timestamp {
        self.header.time
    }

    /// Stack of a sample or allocation
    #[must_use]
    pub fn addresses(&self) -> Option<Addresses<'a>> {
        match &self.record {
            Record::Sample(sample) => Some(sample.addresses),
            Record::Allocation(alloc) => Some(alloc.addresses),
            _ => None,
        }
    }

    /// Thread of a sample or allocation
    #[must_use]
    pub fn tid(&self) -> Option<Tid> {
        match &self.record {
            Record::Sample(sample) => Some(sample.tid),
            Record::Allocation(alloc) => Some(alloc.tid),
            _ => None,
        }
    }
}

/// Mark duration read straight from a frame, used by the sort tie-break
#[must_use]
pub fn mark_duration(data: &[u8], order: ByteOrder) -> Option<i64> {
    (data.get(fh::TYPE) == Some(&fh::TYPE_MARK))
        .then(|| order.i64(data, record::mark::DURATION))
        .flatten()
}

fn decode_sample(data: &[u8], order: ByteOrder) -> Option<SampleRecord<'_>> {
    use record::sample::{ADDRS, N_ADDRS, TID};
    let count = order.u16(data, N_ADDRS)?;
    Some(SampleRecord {
        tid: Tid(order.i32(data, TID)?),
        addresses: Addresses::decode(data, ADDRS, count, order)?,
    })
}

fn decode_allocation(data: &[u8], order: ByteOrder) -> Option<AllocationRecord<'_>> {
    use record::allocation::{ADDRS, ALLOC_ADDR, ALLOC_SIZE, N_ADDRS, TID};
    let count = order.u16(data, N_ADDRS)?;
    Some(AllocationRecord {
        address: order.u64(data, ALLOC_ADDR)?,
        size: order.i64(data, ALLOC_SIZE)?,
        tid: Tid(order.i32(data, TID)?),
        addresses: Addresses::decode(data, ADDRS, count, order)?,
    })
}

fn decode_map(data: &[u8], order: ByteOrder) -> Option<MapRecord<'_>> {
    use record::map::{END, FILENAME, INODE, OFFSET, START};
    Some(MapRecord {
        start: order.u64(data, START)?,
        end: order.u64(data, END)?,
        offset: order.u64(data, OFFSET)?,
        inode: order.u64(data, INODE)?,
        file: tail_str(data, FILENAME)?,
    })
}

fn decode_jitmap(data: &[u8], order: ByteOrder) -> Option<JitmapRecord<'_>> {
    use record::jitmap::{DATA, N_JITMAPS};
    let count = order.u32(data, N_JITMAPS)?;
    let mut entries = Vec::new();
    let mut pos = DATA;
    for _ in 0..count {
        let address = order.u64(data, pos)?;
        let tail = data.get(pos + 8..)?;
        let nul = tail.iter().position(|&b| b == 0)?;
        entries.push((address, String::from_utf8_lossy(&tail[..nul])));
        pos += 8 + nul + 1;
    }
    Some(JitmapRecord { entries })
}

fn decode_ctrdef(data: &[u8], order: ByteOrder) -> Option<CounterDefineRecord<'_>> {
    use record::ctrdef::{
        CATEGORY, CATEGORY_LEN, COUNTERS, COUNTER_SIZE, DESCRIPTION, DESCRIPTION_LEN, ID, NAME,
        NAME_LEN, N_COUNTERS, TYPE, TYPE_DOUBLE, VALUE,
    };
    let count = order.u16(data, N_COUNTERS)?;
    let mut counters = Vec::with_capacity(usize::from(count));
    for i in 0..usize::from(count) {
        let base = COUNTERS + i * COUNTER_SIZE;
        let entry = data.get(base..base + COUNTER_SIZE)?;
        let counter_type = match entry[TYPE] {
            TYPE_DOUBLE => CounterType::Double,
            _ => CounterType::Int64,
        };
        counters.push(CounterDefinition {
            id: order.u24(entry, ID)?,
            counter_type,
            category: field_str(entry, CATEGORY, CATEGORY_LEN)?,
            name: field_str(entry, NAME, NAME_LEN)?,
            description: field_str(entry, DESCRIPTION, DESCRIPTION_LEN)?,
            value: array(entry, VALUE)?,
        });
    }
    Some(CounterDefineRecord { counters })
}

fn decode_ctrset(data: &[u8], order: ByteOrder) -> Option<CounterSetRecord> {
    use record::ctrset::{GROUPS, GROUP_SIZE, GROUP_SLOTS, IDS, N_GROUPS, VALUES};
    let count = order.u16(data, N_GROUPS)?;
    let mut values = Vec::new();
    for i in 0..usize::from(count) {
        let group = data.get(GROUPS + i * GROUP_SIZE..GROUPS + (i + 1) * GROUP_SIZE)?;
        for slot in 0..GROUP_SLOTS {
            let id = order.u32(group, IDS + slot * 4)?;
            if id == 0 {
                continue;
            }
            values.push((id, array(group, VALUES + slot * 8)?));
        }
    }
    Some(CounterSetRecord { values })
}

fn decode_mark(data: &[u8], order: ByteOrder) -> Option<MarkRecord<'_>> {
    use record::mark::{DURATION, GROUP, GROUP_LEN, MESSAGE, NAME, NAME_LEN};
    Some(MarkRecord {
        duration: order.i64(data, DURATION)?,
        group: field_str(data, GROUP, GROUP_LEN)?,
        name: field_str(data, NAME, NAME_LEN)?,
        message: tail_str(data, MESSAGE)?,
    })
}

fn decode_file_chunk(data: &[u8], order: ByteOrder) -> Option<FileChunkRecord<'_>> {
    use record::file_chunk::{DATA, FLAGS, FLAG_IS_LAST, LEN, PATH, PATH_LEN};
    let flags = order.u16(data, FLAGS)?;
    let len = usize::from(order.u16(data, LEN)?);
    let path_field = data.get(PATH..PATH + PATH_LEN)?;
    Some(FileChunkRecord {
        path: field_str(path_field, 0, PATH_LEN)?,
        path_terminated: path_field.contains(&0),
        is_last: flags & FLAG_IS_LAST != 0,
        data: data.get(DATA..DATA + len)?,
    })
}

fn decode_overlay(data: &[u8], order: ByteOrder) -> Option<OverlayRecord<'_>> {
    use record::overlay::{DATA, DST_LEN, LAYER, SRC_LEN};
    let src_len = usize::from(order.u16(data, SRC_LEN)?);
    let dst_len = usize::from(order.u16(data, DST_LEN)?);
    let dst_start = DATA + src_len + 1;
    if data.get(DATA + src_len) != Some(&0) || data.get(dst_start + dst_len) != Some(&0) {
        return None;
    }
    Some(OverlayRecord {
        layer: *data.get(LAYER)?,
        source: String::from_utf8_lossy(data.get(DATA..DATA + src_len)?),
        destination: String::from_utf8_lossy(data.get(dst_start..dst_start + dst_len)?),
    })
}
