//! Hotspot analysis for symbolized captures.
//!
//! Aggregates the leaf (innermost) symbol of every traceable stack to find
//! the functions most samples and allocations land in.
//!
//! # Architecture
//!
//! - **`HotspotStats`** - Aggregation as stacks stream in
//! - **`analyze_hotspots()`** - Batch analysis over a symbolized `Document`
//!
//! ## Data Flow
//!
//! ```text
//! Document::traceables()
//!     │
//!     ├──► Document::symbolize_traceable()   ← innermost first
//!     │
//!     └──► HotspotStats::record_stack()      ← leaf keyed by (name, nick)
//!              │
//!              └──► to_hotspots()            ← sorted by count, descending
//! ```
//!
//! # Performance
//!
//! - `record_stack()`: O(1) amortized
//! - `to_hotspots()`: O(n log n) where n = unique leaf symbols

// Percentage calculations intentionally convert usize to f64
#![allow(clippy::cast_precision_loss)]

use crate::document::Document;
use crate::domain::Pid;
use crate::symbols::Symbol;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum distinct caller chains kept per hotspot.
const MAX_CALL_STACKS_PER_HOTSPOT: usize = 5;

/// Frames kept in each representative caller chain, leaf excluded.
const MAX_CALLERS_PER_STACK: usize = 8;

// =============================================================================
// FUNCTION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A leaf symbol with aggregated statistics.
///
/// ```text
/// HOTSPOTS
/// ─────────────────────────────────────────────
///   do_syscall_64          Kernel      42.3%
///   In File /usr/bin/app+0x1a2c         18.7%
///   js::render             JIT         12.1%
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FunctionHotspot {
    /// Symbol name, or its fallback placeholder.
    pub name: String,

    /// Short name of the binary the symbol came from.
    pub nick: Option<String>,

    /// Traceables whose stack ends in this symbol.
    pub count: usize,

    /// Percentage of symbolized traceables (0.0 - 100.0).
    pub percentage: f64,

    /// Per-process breakdown: pid → count.
    pub processes: BTreeMap<i32, usize>,

    /// Representative caller chains, most frequent first, innermost caller first.
    pub call_stacks: Vec<Vec<String>>,
}

// =============================================================================
// HOTSPOT STATS (AGGREGATOR)
// =============================================================================

/// Leaf-symbol aggregator.
#[derive(Debug, Default)]
pub struct HotspotStats {
    /// Keyed by (name, nick).
    functions: HashMap<(String, Option<String>), FunctionStats>,

    /// Stacks recorded; the percentage denominator.
    total_stacks: u64,
}

#[derive(Debug, Default)]
struct FunctionStats {
    count: u64,
    processes: HashMap<i32, u64>,
    call_stacks: Vec<(Vec<String>, u64)>,
}

impl HotspotStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one symbolized stack, innermost first.
    ///
    /// Empty stacks are ignored: nothing in them resolved.
    pub fn record_stack(&mut self, pid: Pid, stack: &[Symbol]) {
        let Some(leaf) = stack.first() else { return };
        self.total_stacks += 1;

        let key = (leaf.name().to_string(), leaf.binary_nick().map(str::to_string));
        let stats = self.functions.entry(key).or_default();
        stats.count += 1;
        *stats.processes.entry(pid.0).or_insert(0) += 1;

        let callers: Vec<String> = stack[1..]
            .iter()
            .take(MAX_CALLERS_PER_STACK)
            .map(|s| s.name().to_string())
            .collect();
        if callers.is_empty() {
            return;
        }
        if let Some((_, count)) = stats.call_stacks.iter_mut().find(|(c, _)| *c == callers) {
            *count += 1;
        } else if stats.call_stacks.len() < MAX_CALL_STACKS_PER_HOTSPOT {
            stats.call_stacks.push((callers, 1));
        }
    }

    #[must_use]
    pub fn total_stacks(&self) -> u64 {
        self.total_stacks
    }

    /// Convert cumulative stats to a hotspot list, most frequent first
    ///
    /// Equal counts are ordered by name so the output is stable.
    #[must_use]
    pub fn to_hotspots(&self) -> Vec<FunctionHotspot> {
        let mut hotspots: Vec<FunctionHotspot> = self
            .functions
            .iter()
            .map(|((name, nick), stats)| {
                let percentage = if self.total_stacks > 0 {
                    (stats.count as f64 / self.total_stacks as f64) * 100.0
                } else {
                    0.0
                };

                let mut sorted_stacks = stats.call_stacks.clone();
                sorted_stacks.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

                FunctionHotspot {
                    name: name.clone(),
                    nick: nick.clone(),
                    count: usize::try_from(stats.count).unwrap_or(usize::MAX),
                    percentage,
                    processes: stats
                        .processes
                        .iter()
                        .map(|(&pid, &n)| (pid, usize::try_from(n).unwrap_or(usize::MAX)))
                        .collect(),
                    call_stacks: sorted_stacks.into_iter().map(|(stack, _)| stack).collect(),
                }
            })
            .collect();

        hotspots.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        hotspots
    }
}

/// Leaf-symbol hotspots of every traceable in `document`.
///
/// Empty until the document has been symbolized.
#[must_use]
pub fn analyze_hotspots(document: &Document, max_depth: usize) -> Vec<FunctionHotspot> {
    if !document.is_symbolized() {
        return Vec::new();
    }

    let mut stats = HotspotStats::new();
    for frame in document.traceables().iter() {
        let (stack, _) = document.symbolize_traceable(&frame, max_depth);
        stats.record_stack(frame.pid(), &stack);
    }
    stats.to_hotspots()
}
