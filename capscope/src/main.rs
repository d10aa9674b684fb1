//! # capscope - Main Entry Point
//!
//! Loads one capture, prints an overview, and optionally:
//! - **Symbolizes** it (`--symbolize`) and prints the hottest leaf functions
//! - **Translates** paths through a process's mount namespace (`--translate`)
//! - **Exports** a JSON summary (`--export summary.json`)
//!
//! Ctrl+C during symbolization cancels it; the overview is still printed.

// Time conversions lose precision for display
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use capscope::analysis::analyze_hotspots;
use capscope::cli::Args;
use capscope::domain::{DocumentError, Pid};
use capscope::export::DocumentSummary;
use capscope::symbolization::MultiSymbolizer;
use capscope::Document;
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOINPUT: i32 = 66;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DocumentError>() {
        Some(DocumentError::Open { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            EXIT_NOINPUT
        }
        Some(DocumentError::Capture(_)) => EXIT_NOINPUT,
        _ if err.to_string().to_lowercase().contains("unknown process") => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if !quiet {
        println!("capscope v{}", env!("CARGO_PKG_VERSION"));
        println!("capture: {}", args.capture.display());
    }

    // ── Phase 1: Load ───────────────────────────────────────────────────
    let document = Document::open_with_progress(&args.capture, |fraction, stage| {
        debug!("load {:>3.0}%: {stage}", fraction * 100.0);
    })
    .await?;
    let document = Arc::new(document);

    if !quiet {
        print_overview(&document);
    }

    // ── Phase 2: Symbolize (optional, cancellable) ──────────────────────
    if args.symbolize {
        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });

        match document.symbolize(MultiSymbolizer::standard(), cancel).await {
            Ok(()) => {
                if !quiet {
                    print_hotspots(&document, args.max_depth, args.top);
                }
            }
            Err(DocumentError::Cancelled) => warn!("Symbolization cancelled, continuing without"),
            Err(e) => return Err(e).context("Symbolization failed"),
        }
    }

    // ── Phase 3: Path translation ───────────────────────────────────────
    for (pid, path) in &args.translate {
        let process = document
            .process_info(Pid(*pid))
            .with_context(|| format!("Unknown process {pid} in capture"))?;
        println!("{path} (pid {pid}):");
        for candidate in process.mount_namespace.translate(path) {
            println!("  {candidate}");
        }
    }

    // ── Phase 4: Export ─────────────────────────────────────────────────
    if let Some(ref export_path) = args.export {
        let summary = DocumentSummary::new(&document, args.max_depth, args.top);
        summary
            .save(export_path)
            .with_context(|| format!("Failed to export summary to {}", export_path.display()))?;
        info!("Summary written to {}", export_path.display());

        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}

fn print_overview(document: &Document) {
    let span = document.time_span();
    let categories = document.categories();

    println!("duration: {:.3}s", span.duration_nanos() as f64 / 1_000_000_000.0);
    println!("frames: {} ({:?})", document.len(), document.index_stop());
    println!(
        "samples: {} ({} with context switches), allocations: {}",
        categories.samples.len(),
        categories.samples_with_context_switch.len(),
        categories.allocations.len(),
    );
    if let Some(cpu) = document.list_cpus().first() {
        let model = cpu.model_name.as_deref().unwrap_or("unknown model");
        println!("cpus: {} ({model})", document.list_cpus().len());
    }
    println!("processes: {}", document.list_processes().count());
    println!("counters: {}", document.counters().len());
    println!("marks: {}", categories.marks.len());

    let files = document.list_files();
    if !files.is_empty() {
        println!("files: {}", files.len());
    }
}

fn print_hotspots(document: &Document, max_depth: usize, top: usize) {
    let hotspots = analyze_hotspots(document, max_depth);
    if hotspots.is_empty() {
        println!("no symbolized stacks");
        return;
    }

    println!("\nHOTSPOTS");
    println!("{}", "─".repeat(60));
    for hotspot in hotspots.iter().take(top) {
        println!(
            "  {:>6.2}%  {:>7}  {}  {}",
            hotspot.percentage,
            hotspot.count,
            hotspot.name,
            hotspot.nick.as_deref().unwrap_or(""),
        );
    }
}
