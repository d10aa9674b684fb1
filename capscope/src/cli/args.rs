//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// Default number of frames walked per stack
pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Parser)]
#[command(
    name = "capscope",
    about = "Inspect and symbolize Linux profiling captures",
    after_help = "\
EXAMPLES:
    capscope trace.syscap                              Summarize a capture
    capscope trace.syscap --symbolize --top 20         Show the 20 hottest functions
    capscope trace.syscap --export summary.json        Write a JSON summary
    capscope trace.syscap --translate 4242:/usr/bin/app
                                                       Show where a container path lives on the host"
)]
pub struct Args {
    /// Capture file to load
    #[arg(value_name = "CAPTURE")]
    pub capture: PathBuf,

    /// Resolve stack addresses (jitmap, kallsyms and ELF binaries on this host)
    #[arg(short, long)]
    pub symbolize: bool,

    /// Maximum frames walked per stack
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH, value_name = "N")]
    pub max_depth: usize,

    /// Write a JSON summary of the capture
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Translate a path as seen by a process to host candidates (repeatable)
    #[arg(long, value_name = "PID:PATH", value_parser = parse_translate)]
    pub translate: Vec<(i32, String)>,

    /// Number of hotspots to print and export
    #[arg(long, default_value = "10", value_name = "N")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parse `PID:PATH`
fn parse_translate(value: &str) -> Result<(i32, String), String> {
    let (pid, path) =
        value.split_once(':').ok_or_else(|| format!("expected PID:PATH, got \"{value}\""))?;
    let pid = pid.parse::<i32>().map_err(|e| format!("invalid pid \"{pid}\": {e}"))?;
    if !path.starts_with('/') {
        return Err(format!("path must be absolute, got \"{path}\""));
    }
    Ok((pid, path.to_string()))
}
