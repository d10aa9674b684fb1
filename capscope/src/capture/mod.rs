//! # Capture File Access
//!
//! Everything that touches the raw bytes of a capture lives here: the
//! header, bounds-checked field reads in either byte order, typed frame
//! decoding, the forward-scan indexer, and a writer for producing captures.
//!
//! ## Indexing Flow
//!
//! ```text
//! mapped bytes
//!     │
//!     ├──► CaptureHeader::parse()   ← fatal only if shorter than the header
//!     │
//!     ├──► index_frames()           ← (offset, len) per frame, stops at damage
//!     │
//!     ├──► sort_frames()            ← by time, longer marks first on ties
//!     │
//!     └──► Frame::decode()          ← on demand, per index entry
//! ```

pub mod endian;
pub mod frame;
pub mod header;
pub mod indexer;
pub mod writer;

pub use endian::ByteOrder;
pub use frame::{
    Addresses, AllocationRecord, CounterDefineRecord, CounterDefinition, CounterSetRecord,
    CounterType, CounterValue, FileChunkRecord, Frame, FrameHeader, FrameType, JitmapRecord,
    LogRecord, MapRecord, MarkRecord, MetadataRecord, OverlayRecord, ProcessRecord, Record,
    SampleRecord,
};
pub use header::CaptureHeader;
pub use indexer::{index_frames, sort_frames, FrameIndexEntry, IndexStop};
pub use writer::{CaptureWriter, CounterSpec, FILE_CHUNK_SIZE};
