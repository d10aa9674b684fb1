//! Analysis over loaded documents
//!
//! Pure aggregation logic, kept apart from the CLI presentation in `main.rs`.

pub mod hotspots;

pub use hotspots::{analyze_hotspots, FunctionHotspot, HotspotStats};
