//! Capture writer
//!
//! Serializes records in the wire format read by [`super::Frame`], in either
//! byte order. Producers use it to emit captures and the test suite uses it
//! to build byte-exact fixtures.

// Record builders mirror the wire layout field for field
#![allow(clippy::too_many_arguments)]

use super::endian::{put_native_f64, ByteOrder};
use super::frame::{CounterType, CounterValue, FrameType};
use capscope_common::{
    frame as fh, header, record, CAPTURE_ALIGN, CAPTURE_MAGIC, CAPTURE_VERSION, FRAME_HEADER_SIZE,
    HEADER_SIZE,
};
use log::warn;
use std::fs;
use std::io;
use std::path::Path;

/// Largest payload placed in one file-chunk record
pub const FILE_CHUNK_SIZE: usize = 4096;

/// Definition of one counter for [`CaptureWriter::define_counters`]
#[derive(Debug, Clone)]
pub struct CounterSpec<'a> {
    pub id: u32,
    pub category: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub value: CounterValue,
}

/// In-memory capture builder
pub struct CaptureWriter {
    order: ByteOrder,
    buf: Vec<u8>,
}

impl CaptureWriter {
    /// Start a capture whose recording began at `start_time`
    #[must_use]
    pub fn new(order: ByteOrder, start_time: i64) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE * 4);
        order.put_u32(&mut buf, CAPTURE_MAGIC);
        buf.push(CAPTURE_VERSION);
        buf.push(u8::from(order == ByteOrder::Little));
        buf.resize(HEADER_SIZE, 0);

        let mut writer = Self { order, buf };
        writer.patch_i64(header::TIME, start_time);
        writer
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_end_time(&mut self, end_time: i64) {
        self.patch_i64(header::END_TIME, end_time);
    }

    pub fn set_capture_time(&mut self, capture_time: &str) {
        let field = &mut self.buf[header::CAPTURE_TIME..header::CAPTURE_TIME + header::CAPTURE_TIME_LEN];
        field.fill(0);
        let bytes = capture_time.as_bytes();
        let n = bytes.len().min(header::CAPTURE_TIME_LEN - 1);
        field[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn add_timestamp(&mut self, time: i64, cpu: i16, pid: i32) -> bool {
        self.frame(time, cpu, pid, FrameType::Timestamp, |_, _| {})
    }

    pub fn add_process(&mut self, time: i64, cpu: i16, pid: i32, command_line: &str) -> bool {
        self.frame(time, cpu, pid, FrameType::Process, |out, start| {
            pad_to(out, start, record::process::CMDLINE);
            put_cstr(out, command_line);
        })
    }

    pub fn add_map(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        start_addr: u64,
        end_addr: u64,
        offset: u64,
        inode: u64,
        file: &str,
    ) -> bool {
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Map, |out, start| {
            pad_to(out, start, record::map::START);
            order.put_u64(out, start_addr);
            order.put_u64(out, end_addr);
            order.put_u64(out, offset);
            order.put_u64(out, inode);
            put_cstr(out, file);
        })
    }

    pub fn add_fork(&mut self, time: i64, cpu: i16, pid: i32, child_pid: i32) -> bool {
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Fork, |out, start| {
            pad_to(out, start, record::fork::CHILD_PID);
            order.put_i32(out, child_pid);
        })
    }

    pub fn add_exit(&mut self, time: i64, cpu: i16, pid: i32) -> bool {
        self.frame(time, cpu, pid, FrameType::Exit, |_, _| {})
    }

    pub fn add_sample(&mut self, time: i64, cpu: i16, pid: i32, tid: i32, addrs: &[u64]) -> bool {
        let Ok(n_addrs) = u16::try_from(addrs.len()) else {
            warn!("Dropping sample with {} addresses", addrs.len());
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Sample, |out, start| {
            pad_to(out, start, record::sample::N_ADDRS);
            order.put_u16(out, n_addrs);
            pad_to(out, start, record::sample::TID);
            order.put_i32(out, tid);
            addrs.iter().for_each(|&a| order.put_u64(out, a));
        })
    }

    pub fn add_allocation(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        tid: i32,
        alloc_addr: u64,
        alloc_size: i64,
        addrs: &[u64],
    ) -> bool {
        let Ok(n_addrs) = u16::try_from(addrs.len()) else {
            warn!("Dropping allocation with {} addresses", addrs.len());
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Allocation, |out, start| {
            pad_to(out, start, record::allocation::ALLOC_ADDR);
            order.put_u64(out, alloc_addr);
            order.put_i64(out, alloc_size);
            order.put_i32(out, tid);
            order.put_u16(out, n_addrs);
            pad_to(out, start, record::allocation::ADDRS);
            addrs.iter().for_each(|&a| order.put_u64(out, a));
        })
    }

    pub fn add_jitmap(&mut self, time: i64, cpu: i16, pid: i32, entries: &[(u64, &str)]) -> bool {
        let Ok(count) = u32::try_from(entries.len()) else {
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Jitmap, |out, start| {
            pad_to(out, start, record::jitmap::N_JITMAPS);
            order.put_u32(out, count);
            for (address, name) in entries {
                order.put_u64(out, *address);
                put_cstr(out, name);
            }
        })
    }

    pub fn define_counters(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        counters: &[CounterSpec<'_>],
    ) -> bool {
        use record::ctrdef::{
            CATEGORY_LEN, COUNTERS, COUNTER_SIZE, DESCRIPTION_LEN, MAX_ID, NAME_LEN, N_COUNTERS,
            TYPE_DOUBLE, TYPE_INT64,
        };
        let Ok(count) = u16::try_from(counters.len()) else {
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::CounterDefine, |out, start| {
            pad_to(out, start, N_COUNTERS);
            order.put_u16(out, count);
            pad_to(out, start, COUNTERS);
            for counter in counters {
                put_field(out, counter.category, CATEGORY_LEN);
                put_field(out, counter.name, NAME_LEN);
                put_field(out, counter.description, DESCRIPTION_LEN);
                order.put_u24(out, counter.id & MAX_ID);
                out.push(match counter.value.counter_type() {
                    CounterType::Int64 => TYPE_INT64,
                    CounterType::Double => TYPE_DOUBLE,
                });
                put_value(out, order, counter.value);
            }
            debug_assert_eq!((out.len() - start - COUNTERS) % COUNTER_SIZE, 0);
        })
    }

    /// Record new values; ids are packed eight to a group
    pub fn set_counters(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        values: &[(u32, CounterValue)],
    ) -> bool {
        use record::ctrset::{GROUPS, GROUP_SLOTS, N_GROUPS};
        let Ok(n_groups) = u16::try_from(values.len().div_ceil(GROUP_SLOTS)) else {
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::CounterSet, |out, start| {
            pad_to(out, start, N_GROUPS);
            order.put_u16(out, n_groups);
            pad_to(out, start, GROUPS);
            for group in values.chunks(GROUP_SLOTS) {
                for slot in 0..GROUP_SLOTS {
                    order.put_u32(out, group.get(slot).map_or(0, |(id, _)| *id));
                }
                for slot in 0..GROUP_SLOTS {
                    match group.get(slot) {
                        Some((_, value)) => put_value(out, order, *value),
                        None => out.extend_from_slice(&[0; 8]),
                    }
                }
            }
        })
    }

    pub fn add_mark(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        duration: i64,
        group: &str,
        name: &str,
        message: &str,
    ) -> bool {
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Mark, |out, start| {
            pad_to(out, start, record::mark::DURATION);
            order.put_i64(out, duration);
            put_field(out, group, record::mark::GROUP_LEN);
            put_field(out, name, record::mark::NAME_LEN);
            put_cstr(out, message);
        })
    }

    pub fn add_metadata(&mut self, time: i64, cpu: i16, pid: i32, id: &str, data: &str) -> bool {
        self.frame(time, cpu, pid, FrameType::Metadata, |out, start| {
            pad_to(out, start, record::metadata::ID);
            put_field(out, id, record::metadata::ID_LEN);
            put_cstr(out, data);
        })
    }

    pub fn add_log(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        severity: u16,
        domain: &str,
        message: &str,
    ) -> bool {
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Log, |out, start| {
            pad_to(out, start, record::log::SEVERITY);
            order.put_u16(out, severity);
            pad_to(out, start, record::log::DOMAIN);
            put_field(out, domain, record::log::DOMAIN_LEN);
            put_cstr(out, message);
        })
    }

    pub fn add_file_chunk(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        path: &str,
        is_last: bool,
        data: &[u8],
    ) -> bool {
        use record::file_chunk::{FLAGS, FLAG_IS_LAST, PATH_LEN};
        let Ok(len) = u16::try_from(data.len()) else {
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::FileChunk, |out, start| {
            pad_to(out, start, FLAGS);
            order.put_u16(out, if is_last { FLAG_IS_LAST } else { 0 });
            order.put_u16(out, len);
            put_field(out, path, PATH_LEN);
            out.extend_from_slice(data);
        })
    }

    /// Embed a whole file as a run of chunks, the last one flagged
    pub fn add_file(&mut self, time: i64, cpu: i16, pid: i32, path: &str, contents: &[u8]) -> bool {
        if contents.is_empty() {
            return self.add_file_chunk(time, cpu, pid, path, true, &[]);
        }
        let n_chunks = contents.len().div_ceil(FILE_CHUNK_SIZE);
        contents.chunks(FILE_CHUNK_SIZE).enumerate().all(|(i, chunk)| {
            self.add_file_chunk(time, cpu, pid, path, i + 1 == n_chunks, chunk)
        })
    }

    pub fn add_overlay(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        layer: u8,
        source: &str,
        destination: &str,
    ) -> bool {
        use record::overlay::{DATA, LAYER, SRC_LEN};
        let (Ok(src_len), Ok(dst_len)) =
            (u16::try_from(source.len()), u16::try_from(destination.len()))
        else {
            return false;
        };
        let order = self.order;
        self.frame(time, cpu, pid, FrameType::Overlay, |out, start| {
            pad_to(out, start, LAYER);
            out.push(layer);
            pad_to(out, start, SRC_LEN);
            order.put_u16(out, src_len);
            order.put_u16(out, dst_len);
            pad_to(out, start, DATA);
            put_cstr(out, source);
            put_cstr(out, destination);
        })
    }

    /// Current capture bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Write the capture to `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, &self.buf)
    }

    fn patch_i64(&mut self, offset: usize, value: i64) {
        let mut bytes = Vec::with_capacity(8);
        self.order.put_i64(&mut bytes, value);
        self.buf[offset..offset + 8].copy_from_slice(&bytes);
    }

    /// Append one frame; `body` writes everything after the frame header
    fn frame(
        &mut self,
        time: i64,
        cpu: i16,
        pid: i32,
        kind: FrameType,
        body: impl FnOnce(&mut Vec<u8>, usize),
    ) -> bool {
        let start = self.buf.len();
        let order = self.order;
        order.put_u16(&mut self.buf, 0);
        order.put_i16(&mut self.buf, cpu);
        order.put_i32(&mut self.buf, pid);
        order.put_i64(&mut self.buf, time);
        self.buf.push(kind.tag());
        pad_to(&mut self.buf, start, FRAME_HEADER_SIZE);

        body(&mut self.buf, start);

        let aligned = (self.buf.len() - start).next_multiple_of(CAPTURE_ALIGN);
        let Ok(len) = u16::try_from(aligned) else {
            warn!("Dropping {kind} frame of {aligned} bytes, larger than the frame limit");
            self.buf.truncate(start);
            return false;
        };
        pad_to(&mut self.buf, start, aligned);

        let mut prefix = Vec::with_capacity(2);
        order.put_u16(&mut prefix, len);
        self.buf[start + fh::LEN..start + fh::LEN + 2].copy_from_slice(&prefix);
        true
    }
}

/// Zero-fill up to `offset` bytes past `start`
fn pad_to(out: &mut Vec<u8>, start: usize, offset: usize) {
    if out.len() < start + offset {
        out.resize(start + offset, 0);
    }
}

fn put_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write `s` into a fixed-size, NUL-padded field, truncating if needed
fn put_field(out: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len - 1);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (len - n), 0);
}

/// Integers follow the file byte order; doubles stay in native order
fn put_value(out: &mut Vec<u8>, order: ByteOrder, value: CounterValue) {
    match value {
        CounterValue::Int64(v) => order.put_i64(out, v),
        CounterValue::Double(v) => put_native_f64(out, v),
    }
}
