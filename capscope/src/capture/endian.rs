//! Byte-order aware, bounds-checked field access
//!
//! Every read takes the frame slice and an offset and returns `None` when
//! the field would run past the slice, so a truncated record can never be
//! read out of bounds.

use byteorder::{BigEndian, ByteOrder as Endian, LittleEndian, NativeEndian};
use std::borrow::Cow;

/// Byte order of a capture file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

macro_rules! read_int {
    ($name:ident, $ty:ty, $read:ident, $len:expr) => {
        #[must_use]
        pub fn $name(self, data: &[u8], offset: usize) -> Option<$ty> {
            let bytes = slice(data, offset, $len)?;
            Some(match self {
                ByteOrder::Little => <LittleEndian as Endian>::$read(bytes),
                ByteOrder::Big => <BigEndian as Endian>::$read(bytes),
            })
        }
    };
}

macro_rules! write_int {
    ($name:ident, $ty:ty, $write:ident, $len:expr) => {
        pub fn $name(self, out: &mut Vec<u8>, value: $ty) {
            let mut buf = [0u8; $len];
            match self {
                ByteOrder::Little => <LittleEndian as Endian>::$write(&mut buf, value),
                ByteOrder::Big => <BigEndian as Endian>::$write(&mut buf, value),
            }
            out.extend_from_slice(&buf);
        }
    };
}

impl ByteOrder {
    /// Byte order of the machine running the analysis
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Interpret the header's little-endian flag
    #[must_use]
    pub fn from_little_endian_flag(flag: u8) -> Self {
        if flag != 0 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Returns true when values must be byte-swapped to match the host
    #[must_use]
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }

    read_int!(u16, u16, read_u16, 2);
    read_int!(i16, i16, read_i16, 2);
    read_int!(u24, u32, read_u24, 3);
    read_int!(u32, u32, read_u32, 4);
    read_int!(i32, i32, read_i32, 4);
    read_int!(u64, u64, read_u64, 8);
    read_int!(i64, i64, read_i64, 8);

    write_int!(put_u16, u16, write_u16, 2);
    write_int!(put_i16, i16, write_i16, 2);
    write_int!(put_u32, u32, write_u32, 4);
    write_int!(put_i32, i32, write_i32, 4);
    write_int!(put_u64, u64, write_u64, 8);
    write_int!(put_i64, i64, write_i64, 8);

    /// Write the low 24 bits of `value`
    pub fn put_u24(self, out: &mut Vec<u8>, value: u32) {
        let mut buf = [0u8; 3];
        let value = value & 0x00FF_FFFF;
        match self {
            ByteOrder::Little => LittleEndian::write_u24(&mut buf, value),
            ByteOrder::Big => BigEndian::write_u24(&mut buf, value),
        }
        out.extend_from_slice(&buf);
    }
}

/// Host-order `i64`, as stored by producers for counter values
#[must_use]
pub fn native_i64(raw: &[u8; 8]) -> i64 {
    NativeEndian::read_i64(raw)
}

/// Host-order `f64`; counter doubles are never swapped
#[must_use]
pub fn native_f64(raw: &[u8; 8]) -> f64 {
    NativeEndian::read_f64(raw)
}

/// Append `value` in host order
pub fn put_native_f64(out: &mut Vec<u8>, value: f64) {
    let mut buf = [0u8; 8];
    NativeEndian::write_f64(&mut buf, value);
    out.extend_from_slice(&buf);
}

/// The `len` bytes starting at `offset`, if they lie inside `data`
#[must_use]
pub fn slice(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    data.get(offset..end)
}

/// Copy `N` bytes starting at `offset`
#[must_use]
pub fn array<const N: usize>(data: &[u8], offset: usize) -> Option<[u8; N]> {
    slice(data, offset, N)?.try_into().ok()
}

/// Read a string from a fixed-size field, stopping at the first NUL
///
/// The field is clipped to the end of `data`; an unterminated field yields
/// everything up to the clip point.
#[must_use]
pub fn field_str(data: &[u8], offset: usize, len: usize) -> Option<Cow<'_, str>> {
    let field = data.get(offset..)?;
    let field = &field[..len.min(field.len())];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Some(String::from_utf8_lossy(&field[..end]))
}

/// Read a NUL-terminated string running to at most the end of `data`
///
/// A missing terminator yields the rest of the slice.
#[must_use]
pub fn tail_str(data: &[u8], offset: usize) -> Option<Cow<'_, str>> {
    field_str(data, offset, usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_respect_byte_order() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(ByteOrder::Little.u16(&data, 0), Some(0x3412));
        assert_eq!(ByteOrder::Big.u16(&data, 0), Some(0x1234));
        assert_eq!(ByteOrder::Big.u32(&data, 0), Some(0x1234_5678));
        assert_eq!(ByteOrder::Little.u24(&data, 1), Some(0x0078_5634));
        assert_eq!(ByteOrder::Big.u24(&data, 1), Some(0x0034_5678));
    }

    #[test]
    fn test_out_of_bounds_reads_return_none() {
        let data = [0u8; 6];
        assert_eq!(ByteOrder::Little.u64(&data, 0), None);
        assert_eq!(ByteOrder::Little.u16(&data, 5), None);
        assert_eq!(ByteOrder::Little.u16(&data, usize::MAX), None);
    }

    #[test]
    fn test_put_then_read_u24() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut out = Vec::new();
            order.put_u24(&mut out, 0x00AB_CDEF);
            assert_eq!(out.len(), 3);
            assert_eq!(order.u24(&out, 0), Some(0x00AB_CDEF));
        }
    }

    #[test]
    fn test_writes_match_reads_in_both_orders() {
        let mut little = Vec::new();
        ByteOrder::Little.put_u32(&mut little, 0x1234_5678);
        assert_eq!(little, [0x78, 0x56, 0x34, 0x12]);

        let mut big = Vec::new();
        ByteOrder::Big.put_i64(&mut big, -2);
        assert_eq!(big, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(ByteOrder::Big.i64(&big, 0), Some(-2));
        assert_eq!(ByteOrder::Little.i64(&big, 0), Some(-2_i64.swap_bytes()));
    }

    #[test]
    fn test_native_counter_values() {
        let mut out = Vec::new();
        put_native_f64(&mut out, 97.5);
        let raw: [u8; 8] = array(&out, 0).unwrap();
        assert_eq!(native_f64(&raw), 97.5);
        assert_eq!(native_i64(&7_i64.to_ne_bytes()), 7);
    }

    #[test]
    fn test_string_fields() {
        let data = b"abc\0def\0ghi";
        assert_eq!(field_str(data, 0, 8).as_deref(), Some("abc"));
        assert_eq!(field_str(data, 4, 2).as_deref(), Some("de"));
        assert_eq!(tail_str(data, 4).as_deref(), Some("def"));
        assert_eq!(tail_str(data, 8).as_deref(), Some("ghi"));
        assert_eq!(field_str(data, 20, 4), None);
    }
}
