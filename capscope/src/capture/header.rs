//! Capture file header

use super::endian::{field_str, ByteOrder};
use crate::domain::{CaptureError, Timestamp};
use capscope_common::{header, CAPTURE_MAGIC, HEADER_SIZE};
use log::warn;

/// Parsed fixed-size file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHeader {
    pub version: u8,
    pub byte_order: ByteOrder,
    /// Human-readable wall-clock time the recording started
    pub capture_time: String,
    pub time: Timestamp,
    /// End of recording; 0 when the producer never finalized the file
    pub end_time: Timestamp,
}

impl CaptureHeader {
    /// Parse the header at the start of `data`
    ///
    /// # Errors
    /// Returns [`CaptureError::TooShort`] if `data` is smaller than the header
    pub fn parse(data: &[u8]) -> Result<Self, CaptureError> {
        if data.len() < HEADER_SIZE {
            return Err(CaptureError::TooShort { len: data.len() });
        }

        let byte_order = ByteOrder::from_little_endian_flag(data[header::LITTLE_ENDIAN]);
        let read_i64 = |offset| byte_order.i64(data, offset).unwrap_or_default();

        let magic = byte_order.u32(data, header::MAGIC).unwrap_or_default();
        if magic != CAPTURE_MAGIC {
            warn!("Capture magic 0x{magic:08x} does not match 0x{CAPTURE_MAGIC:08x}, continuing");
        }

        Ok(Self {
            version: data[header::VERSION],
            byte_order,
            capture_time: field_str(data, header::CAPTURE_TIME, header::CAPTURE_TIME_LEN)
                .map(|s| s.into_owned())
                .unwrap_or_default(),
            time: Timestamp(read_i64(header::TIME)),
            end_time: Timestamp(read_i64(header::END_TIME)),
        })
    }

    /// Returns true when multi-byte values in the file differ from host order
    #[must_use]
    pub fn needs_swap(&self) -> bool {
        self.byte_order.needs_swap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(order: ByteOrder, time: i64, end_time: i64) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        order.put_u32(&mut out, CAPTURE_MAGIC);
        out.push(1);
        out.push(u8::from(order == ByteOrder::Little));
        out.resize(header::CAPTURE_TIME, 0);
        out.extend_from_slice(b"2026-10-15T09:00:00Z");
        out.resize(header::TIME, 0);
        order.put_i64(&mut out, time);
        order.put_i64(&mut out, end_time);
        out.resize(HEADER_SIZE, 0);
        out
    }

    #[test]
    fn test_parse_little_and_big_endian() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let header = CaptureHeader::parse(&raw_header(order, 1000, 5000)).unwrap();
            assert_eq!(header.byte_order, order);
            assert_eq!(header.time, Timestamp(1000));
            assert_eq!(header.end_time, Timestamp(5000));
            assert_eq!(header.capture_time, "2026-10-15T09:00:00Z");
            assert_eq!(header.version, 1);
        }
    }

    #[test]
    fn test_short_header_is_fatal() {
        let data = raw_header(ByteOrder::Little, 0, 0);
        let err = CaptureHeader::parse(&data[..HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, CaptureError::TooShort { len } if len == HEADER_SIZE - 1));
    }
}
