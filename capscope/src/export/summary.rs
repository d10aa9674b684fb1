//! JSON summary of a loaded document

use crate::analysis::{analyze_hotspots, FunctionHotspot};
use crate::document::{CpuInfo, Document, MarkGroup};
use crate::domain::ExportError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Capture-level facts from the header and the load
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub capture_time: String,
    /// Nanoseconds, as recorded
    pub begin: i64,
    pub end: i64,
    pub duration_seconds: f64,
    pub frames: usize,
    pub native_byte_order: bool,
    pub symbolized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub pid: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    pub threads: Vec<i32>,
    pub exit_time: i64,
    pub memory_maps: usize,
    pub mounts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSummary {
    pub id: u32,
    pub category: String,
    pub name: String,
    pub description: String,
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

/// Everything `capscope --export` writes
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub capture: CaptureSummary,
    /// Category name → frame count
    pub categories: BTreeMap<&'static str, usize>,
    pub cpus: Vec<CpuInfo>,
    pub processes: Vec<ProcessSummary>,
    pub counters: Vec<CounterSummary>,
    pub marks: Vec<MarkGroup>,
    pub files: Vec<String>,
    /// Empty unless the document was symbolized
    pub hotspots: Vec<FunctionHotspot>,
}

impl DocumentSummary {
    /// Summarize `document`, keeping at most `top` hotspots
    #[must_use]
    pub fn new(document: &Document, max_depth: usize, top: usize) -> Self {
        let span = document.time_span();
        let capture = CaptureSummary {
            capture_time: document.header().capture_time.clone(),
            begin: span.begin.0,
            end: span.end.0,
            duration_seconds: crate::domain::Timestamp(span.duration_nanos()).as_seconds(),
            frames: document.len(),
            native_byte_order: document.is_native(),
            symbolized: document.is_symbolized(),
        };

        let mut hotspots = analyze_hotspots(document, max_depth);
        hotspots.truncate(top);

        Self {
            capture,
            categories: category_counts(document),
            cpus: document.list_cpus().to_vec(),
            processes: document
                .list_processes()
                .map(|process| ProcessSummary {
                    pid: process.pid.0,
                    name: process.symbol().name().to_string(),
                    command_line: process.command_line().map(str::to_string),
                    threads: process.threads().map(|tid| tid.0).collect(),
                    exit_time: process.exit_time.0,
                    memory_maps: process.address_layout.len(),
                    mounts: process.mount_namespace.mounts().len(),
                })
                .collect(),
            counters: document
                .counters()
                .iter()
                .map(|counter| CounterSummary {
                    id: counter.id(),
                    category: counter.category().to_string(),
                    name: counter.name().to_string(),
                    description: counter.description().to_string(),
                    min: counter.min(),
                    max: counter.max(),
                    points: counter.len(),
                })
                .collect(),
            marks: document.catalog_marks(),
            files: document.list_files(),
            hotspots,
        }
    }

    /// Write as pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization or the underlying write fails.
    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Write to a new file at `path`
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] if the file cannot be created.
    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)
            .map_err(|e| ExportError::WriteFailed(format!("{}: {e}", path.display())))?;
        self.write_json(BufWriter::new(file))
    }
}

fn category_counts(document: &Document) -> BTreeMap<&'static str, usize> {
    let c = document.categories();
    BTreeMap::from([
        ("samples", c.samples.len()),
        ("samples_with_context_switch", c.samples_with_context_switch.len()),
        ("allocations", c.allocations.len()),
        ("traceables", c.traceables.len()),
        ("processes", c.processes.len()),
        ("memory_maps", c.memory_maps.len()),
        ("marks", c.marks.len()),
        ("counter_definitions", c.counter_definitions.len()),
        ("counter_sets", c.counter_sets.len()),
        ("file_chunks", c.file_chunks.len()),
        ("jitmaps", c.jitmaps.len()),
        ("overlays", c.overlays.len()),
        ("exits", c.exits.len()),
        ("forks", c.forks.len()),
        ("logs", c.logs.len()),
        ("metadata", c.metadata.len()),
        ("unknown", c.unknown.len()),
    ])
}
