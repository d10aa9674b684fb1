//! # Capture Wire Format (Producer ↔ Analyzer)
//!
//! Constants describing the binary capture file layout. They are shared by
//! anything that writes captures and by the `capscope` analysis engine, so
//! both sides agree on offsets without casting raw bytes to structs.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────┐  offset 0
//! │ file header (256 bytes)      │
//! ├──────────────────────────────┤  HEADER_SIZE
//! │ frame │ frame │ frame │ ...  │  each frame: 24-byte frame header + body,
//! └──────────────────────────────┘  total length a multiple of CAPTURE_ALIGN
//! ```
//!
//! Every multi-byte integer is stored in the byte order announced by the
//! header's endianness flag. Counter doubles are the one exception: they
//! are stored in the producer's native order and are never swapped.
//!
//! ## Key Modules
//!
//! - [`header`] - file header field offsets
//! - [`frame`] - frame header field offsets and record type tags
//! - [`record`] - per-record body offsets
//! - [`context`] - context-switch sentinels found in stack address lists

#![no_std]

// ============================================================================
// File-Level Constants
// ============================================================================

/// Magic number at offset 0 of every capture file
pub const CAPTURE_MAGIC: u32 = 0xFDCA_975E;

/// Format version written by current producers
pub const CAPTURE_VERSION: u8 = 1;

/// Size of the fixed file header in bytes
///
/// A file shorter than this cannot be loaded at all.
pub const HEADER_SIZE: usize = 256;

/// Size of the header that starts every frame
pub const FRAME_HEADER_SIZE: usize = 24;

/// Every frame length is a multiple of this value
pub const CAPTURE_ALIGN: usize = 8;

/// Upper bound on stack depth honored by the stack symbolizer
pub const MAX_STACK_DEPTH: usize = 128;

/// High bits marking an address as a JIT-generated symbol id
///
/// Producers that register JIT code emit synthetic addresses
/// `JITMAP_MARK | n` and publish names for them in jitmap records.
pub const JITMAP_MARK: u64 = 0xE000_0000_0000_0000;

// ============================================================================
// File Header
// ============================================================================

/// Offsets inside the 256-byte file header
pub mod header {
    /// `u32` magic, see [`super::CAPTURE_MAGIC`]
    pub const MAGIC: usize = 0;
    /// `u8` format version
    pub const VERSION: usize = 4;
    /// `u8` byte order flag: nonzero means little-endian
    pub const LITTLE_ENDIAN: usize = 5;
    /// NUL-terminated human readable capture time
    pub const CAPTURE_TIME: usize = 8;
    /// Length of the capture time field
    pub const CAPTURE_TIME_LEN: usize = 64;
    /// `i64` recording start time in nanoseconds
    pub const TIME: usize = 72;
    /// `i64` recording end time in nanoseconds (0 if the producer never set it)
    pub const END_TIME: usize = 80;
}

// ============================================================================
// Frame Header
// ============================================================================

/// Offsets inside the 24-byte frame header and the record type tags
pub mod frame {
    /// `u16` total frame length including this header
    pub const LEN: usize = 0;
    /// `i16` cpu the record was produced on (-1 when unknown)
    pub const CPU: usize = 2;
    /// `i32` owning process id
    pub const PID: usize = 4;
    /// `i64` record timestamp in nanoseconds
    pub const TIME: usize = 8;
    /// `u8` record type tag (endian independent)
    pub const TYPE: usize = 16;

    pub const TYPE_TIMESTAMP: u8 = 1;
    pub const TYPE_SAMPLE: u8 = 2;
    pub const TYPE_MAP: u8 = 3;
    pub const TYPE_PROCESS: u8 = 4;
    pub const TYPE_FORK: u8 = 5;
    pub const TYPE_EXIT: u8 = 6;
    pub const TYPE_JITMAP: u8 = 7;
    pub const TYPE_CTRDEF: u8 = 8;
    pub const TYPE_CTRSET: u8 = 9;
    pub const TYPE_MARK: u8 = 10;
    pub const TYPE_METADATA: u8 = 11;
    pub const TYPE_LOG: u8 = 12;
    pub const TYPE_FILE_CHUNK: u8 = 13;
    pub const TYPE_ALLOCATION: u8 = 14;
    pub const TYPE_OVERLAY: u8 = 15;
}

// ============================================================================
// Record Bodies
// ============================================================================

/// Per-record body offsets, relative to the start of the frame
pub mod record {
    /// Sample: `n_addrs: u16`, `tid: i32`, then `u64` addresses
    pub mod sample {
        pub const N_ADDRS: usize = 24;
        pub const TID: usize = 28;
        pub const ADDRS: usize = 32;
    }

    /// Memory map: `start`, `end`, `offset`, `inode` as `u64`, then the file name
    pub mod map {
        pub const START: usize = 24;
        pub const END: usize = 32;
        pub const OFFSET: usize = 40;
        pub const INODE: usize = 48;
        pub const FILENAME: usize = 56;
    }

    /// Process: NUL-terminated command line
    pub mod process {
        pub const CMDLINE: usize = 24;
    }

    /// Fork: `child_pid: i32`
    pub mod fork {
        pub const CHILD_PID: usize = 24;
    }

    /// Jitmap: `n_jitmaps: u32`, then packed `(u64 address, NUL-terminated name)` pairs
    pub mod jitmap {
        pub const N_JITMAPS: usize = 24;
        pub const DATA: usize = 28;
    }

    /// Counter definition: `n_counters: u16`, then 128-byte counter entries
    pub mod ctrdef {
        pub const N_COUNTERS: usize = 24;
        pub const COUNTERS: usize = 32;
        pub const COUNTER_SIZE: usize = 128;

        pub const CATEGORY: usize = 0;
        pub const CATEGORY_LEN: usize = 32;
        pub const NAME: usize = 32;
        pub const NAME_LEN: usize = 32;
        pub const DESCRIPTION: usize = 64;
        pub const DESCRIPTION_LEN: usize = 52;
        /// 24-bit counter id, three bytes in file byte order
        pub const ID: usize = 116;
        /// `u8` value type, see [`TYPE_INT64`] and [`TYPE_DOUBLE`]
        pub const TYPE: usize = 119;
        pub const VALUE: usize = 120;

        pub const TYPE_INT64: u8 = 0;
        pub const TYPE_DOUBLE: u8 = 1;

        /// Largest id representable in the 24-bit field
        pub const MAX_ID: u32 = 0x00FF_FFFF;
    }

    /// Counter set: `n_groups: u16`, then 96-byte groups of eight id/value slots
    ///
    /// An id of 0 marks an unused slot.
    pub mod ctrset {
        pub const N_GROUPS: usize = 24;
        pub const GROUPS: usize = 32;
        pub const GROUP_SIZE: usize = 96;
        pub const GROUP_SLOTS: usize = 8;
        pub const IDS: usize = 0;
        pub const VALUES: usize = 32;
    }

    /// Mark: `duration: i64`, fixed group and name fields, free-form message
    pub mod mark {
        pub const DURATION: usize = 24;
        pub const GROUP: usize = 32;
        pub const GROUP_LEN: usize = 24;
        pub const NAME: usize = 56;
        pub const NAME_LEN: usize = 40;
        pub const MESSAGE: usize = 96;
    }

    /// Metadata: fixed id field, free-form data
    pub mod metadata {
        pub const ID: usize = 24;
        pub const ID_LEN: usize = 40;
        pub const DATA: usize = 64;
    }

    /// Log: `severity: u16`, fixed domain field, free-form message
    pub mod log {
        pub const SEVERITY: usize = 24;
        pub const DOMAIN: usize = 32;
        pub const DOMAIN_LEN: usize = 32;
        pub const MESSAGE: usize = 64;
    }

    /// File chunk: `flags: u16`, `len: u16`, fixed path field, `len` data bytes
    pub mod file_chunk {
        pub const FLAGS: usize = 24;
        pub const LEN: usize = 26;
        pub const PATH: usize = 28;
        pub const PATH_LEN: usize = 256;
        pub const DATA: usize = 284;
        /// Set on the final chunk of a file
        pub const FLAG_IS_LAST: u16 = 0x0001;
    }

    /// Allocation: address, signed size (negative for frees), tid, stack
    pub mod allocation {
        pub const ALLOC_ADDR: usize = 24;
        pub const ALLOC_SIZE: usize = 32;
        pub const TID: usize = 40;
        pub const N_ADDRS: usize = 44;
        pub const ADDRS: usize = 48;
    }

    /// Overlay: `layer: u8`, string lengths, then `"src\0dst\0"`
    pub mod overlay {
        pub const LAYER: usize = 24;
        pub const SRC_LEN: usize = 28;
        pub const DST_LEN: usize = 30;
        pub const DATA: usize = 32;
    }
}

// ============================================================================
// Context Switch Sentinels
// ============================================================================

/// Reserved addresses marking execution context changes in a stack
///
/// These mirror the kernel's `PERF_CONTEXT_*` values. A stack such as
/// `[KERNEL, k1, k2, USER, u1, u2]` reads innermost first: two kernel
/// frames followed by two user frames.
#[allow(clippy::cast_sign_loss)]
pub mod context {
    pub const HYPERVISOR: u64 = -32_i64 as u64;
    pub const KERNEL: u64 = -128_i64 as u64;
    pub const USER: u64 = -512_i64 as u64;
    pub const GUEST: u64 = -2048_i64 as u64;
    pub const GUEST_KERNEL: u64 = -2176_i64 as u64;
    pub const GUEST_USER: u64 = -2560_i64 as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_offsets_fit_alignment() {
        assert_eq!(HEADER_SIZE % CAPTURE_ALIGN, 0);
        assert_eq!(FRAME_HEADER_SIZE % CAPTURE_ALIGN, 0);
        assert_eq!(record::sample::ADDRS % CAPTURE_ALIGN, 0);
        assert_eq!(record::ctrdef::COUNTERS % CAPTURE_ALIGN, 0);
        assert_eq!(record::ctrset::GROUPS % CAPTURE_ALIGN, 0);
    }

    #[test]
    fn test_counter_entry_layout() {
        use record::ctrdef::*;
        assert_eq!(DESCRIPTION + DESCRIPTION_LEN, ID);
        assert_eq!(VALUE + 8, COUNTER_SIZE);
        assert_eq!(record::ctrset::VALUES + 8 * record::ctrset::GROUP_SLOTS, record::ctrset::GROUP_SIZE);
    }

    #[test]
    fn test_context_sentinels_are_high_addresses() {
        assert_eq!(context::KERNEL, 0xFFFF_FFFF_FFFF_FF80);
        assert!(context::USER > JITMAP_MARK);
    }
}
