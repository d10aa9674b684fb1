//! Document export
//!
//! Currently writes a JSON summary: header times, category counts,
//! processes, counters, the mark catalog, embedded files and hotspots.

pub mod summary;

pub use summary::{CaptureSummary, CounterSummary, DocumentSummary, ProcessSummary};
