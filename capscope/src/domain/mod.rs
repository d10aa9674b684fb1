//! Domain model for capscope
//!
//! Identifier newtypes shared by every layer, and the error enums returned
//! by capture parsing, document loading and export.

pub mod errors;
pub mod types;

pub use types::{Pid, Tid, Timestamp};

pub use errors::{CaptureError, DocumentError, ExportError};
