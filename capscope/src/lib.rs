//! # capscope - Linux Profiling Capture Analysis
//!
//! capscope loads the binary capture files written by a system-wide Linux
//! profiler and turns them into a queryable, read-only document: frames
//! indexed in time order, category views over them, per-process memory maps
//! and mount namespaces, counter time series, embedded files, and, once
//! symbolized, readable stack traces.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     capture file (.syscap)                      │
//! │        256-byte header, then aligned self-describing frames     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ mmap
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     capscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Capture    │──▶│   Document   │──▶│  Processes   │         │
//! │  │ (index/sort) │   │ (categories) │   │ (maps/mounts)│         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │ symbolize()                        │
//! │                            ▼                                    │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │ Symbolizers  │──▶│ Symbol Table │         │
//! │                     │ jit/kern/elf │   │ (intervals)  │         │
//! │                     └──────────────┘   └──────┬───────┘         │
//! │                                               ▼                 │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │   Analysis   │──▶│    Export    │         │
//! │                     │  (hotspots)  │   │ (summary)    │         │
//! │                     └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`capture`]: Header parsing, frame decoding, indexing and the capture writer
//!   - `indexer`: Walk frames until the data ends or a frame is malformed
//!   - `writer`: Build captures in either byte order (tests, tools)
//!
//! - [`document`]: The loaded capture and its query surface
//!   - `loader`: The load pipeline, run once on a blocking worker
//!   - `counters`: Counter series reconstructed from definitions and sets
//!   - `file`: Files embedded as chunked, optionally gzipped records
//!   - `marks`: Mark catalog with duration statistics
//!   - `symbolize`: The cancellable symbolization phase
//!
//! - [`process`]: Per-process address layouts and mount namespaces
//!   - Translates paths seen inside containers to host paths
//!
//! - [`symbols`]: Symbols, interval-tree caches and stack symbolization
//!
//! - [`symbolization`]: Address resolvers plugged into the symbolization phase
//!   - Jitmap names, kernel symbols from kallsyms, ELF/DWARF from disk
//!
//! - [`analysis`]: Leaf-symbol hotspot aggregation
//!
//! - [`export`]: JSON document summary
//!
//! ### Support Modules
//!
//! - [`cli`]: Command-line argument parsing
//!
//! - [`strings`]: Interning pool shared by everything a document creates
//!
//! - [`domain`]: Core domain types (Pid, Tid, Timestamp) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Summarize a capture
//! capscope trace.syscap
//!
//! # Symbolize and list the hottest functions
//! capscope trace.syscap --symbolize --top 20
//!
//! # Export a JSON summary
//! capscope trace.syscap --symbolize --export summary.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Frame**: One record in the capture, with a common 24-byte header
//! - **Traceable**: A sample or allocation; both carry a stack of addresses
//! - **Context switch sentinel**: An address in a stack that marks a change
//!   between kernel, user, hypervisor and guest execution
//! - **Mount namespace**: A process's view of the filesystem, reconstructed
//!   from captured `mountinfo` so binaries inside containers can be found

pub mod analysis;
pub mod capture;
pub mod cli;
pub mod document;
pub mod domain;
pub mod export;
pub mod process;
pub mod strings;
pub mod symbolization;
pub mod symbols;

pub use document::Document;
