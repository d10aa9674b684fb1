//! Structured error types for capscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only whole-file problems surface as errors; damaged frames inside an
//! otherwise readable capture are logged and skipped by the indexer.

use capscope_common::HEADER_SIZE;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture is {len} bytes, smaller than the {}-byte header", HEADER_SIZE)]
    TooShort { len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to open capture {path}: {source}")]
    Open { path: String, source: std::io::Error },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Symbolization was cancelled")]
    Cancelled,

    #[error("Symbols were already attached to this document")]
    AlreadySymbolized,

    #[error("Symbol resolution failed: {0}")]
    SymbolizationFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write summary file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
