//! CPU topology from the captured `/proc/cpuinfo`

use super::Document;
use log::{debug, warn};
use serde::Serialize;

/// One logical CPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    /// `processor` number
    pub id: u32,
    pub core_id: u32,
    pub model_name: Option<String>,
}

impl CpuInfo {
    fn new(id: u32) -> Self {
        Self { id, core_id: 0, model_name: None }
    }
}

/// Parse `/proc/cpuinfo` text into one entry per `processor` block
///
/// Keys and values are separated by `:` with any amount of surrounding
/// whitespace. Lines before the first `processor` line are ignored, except
/// the board-level `Model` line some ARM kernels print once: when present
/// it becomes the model name of every CPU.
#[must_use]
pub fn parse_cpuinfo(text: &str) -> Vec<CpuInfo> {
    let mut cpus: Vec<CpuInfo> = Vec::new();
    let mut board_model: Option<&str> = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();

        match key.trim_end() {
            "processor" => cpus.push(CpuInfo::new(value.parse().unwrap_or(0))),
            "core id" => {
                if let (Some(cpu), Ok(core_id)) = (cpus.last_mut(), value.parse()) {
                    cpu.core_id = core_id;
                }
            }
            "model name" => {
                if let Some(cpu) = cpus.last_mut() {
                    cpu.model_name = Some(value.to_string());
                }
            }
            "Model" if board_model.is_none() => board_model = Some(value),
            _ => {}
        }
    }

    if let Some(model) = board_model {
        for cpu in &mut cpus {
            cpu.model_name = Some(model.to_string());
        }
    }
    cpus
}

impl Document {
    /// CPUs described by the capture, in `/proc/cpuinfo` order
    ///
    /// Empty when the capture carries no `/proc/cpuinfo`.
    #[must_use]
    pub fn list_cpus(&self) -> &[CpuInfo] {
        &self.cpus
    }

    pub(super) fn load_cpus(&mut self) {
        let Some(file) = self.lookup_file("/proc/cpuinfo") else {
            debug!("Capture has no /proc/cpuinfo");
            return;
        };
        match file.read_to_string() {
            Ok(text) => self.cpus = parse_cpuinfo(&text),
            Err(e) => warn!("Could not read /proc/cpuinfo from capture: {e}"),
        }
    }
}
