//! # Processes
//!
//! Per-process state reconstructed from a capture: memory maps, mount
//! namespaces, identity and threads.
//!
//! ```text
//!  /proc/mounts ─────► template namespace (devices) ──copy──┐
//!                                                           ▼
//!  /proc/<pid>/mountinfo, overlays ─────────────► ProcessInfo.mount_namespace
//!  map records ─────────────────────────────────► ProcessInfo.address_layout
//!  process records ─────────────────────────────► ProcessInfo.symbol
//! ```

pub mod address_layout;
pub mod mount;
pub mod namespace;
pub mod process_info;

pub use address_layout::{AddressLayout, MemoryMap};
pub use mount::{Mount, MountDevice};
pub use namespace::MountNamespace;
pub use process_info::ProcessInfo;

use crate::domain::Pid;
use crate::strings::StringPool;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Processes keyed by pid, plus the namespace template new processes copy
#[derive(Debug)]
pub struct ProcessTable {
    strings: Arc<StringPool>,
    template: MountNamespace,
    processes: BTreeMap<Pid, ProcessInfo>,
}

impl ProcessTable {
    #[must_use]
    pub fn new(strings: Arc<StringPool>) -> Self {
        Self { strings, template: MountNamespace::new(), processes: BTreeMap::new() }
    }

    /// Process for `pid`, created from the template when `may_create` is set
    ///
    /// Negative pids never have a process.
    pub fn process_info(&mut self, pid: Pid, may_create: bool) -> Option<&mut ProcessInfo> {
        if !pid.is_valid() {
            return None;
        }
        if may_create {
            let Self { strings, template, processes } = self;
            return Some(
                processes
                    .entry(pid)
                    .or_insert_with(|| ProcessInfo::new(strings.as_ref(), pid, template)),
            );
        }
        self.processes.get_mut(&pid)
    }

    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    /// Register a host device with the template and every existing process
    pub fn add_device(&mut self, device: MountDevice) {
        for info in self.processes.values_mut() {
            info.mount_namespace.add_device(device.clone());
        }
        self.template.add_device(device);
    }

    #[must_use]
    pub fn template(&self) -> &MountNamespace {
        &self.template
    }

    /// Processes in ascending pid order
    pub fn iter(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.processes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessInfo> {
        self.processes.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    #[must_use]
    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_pid_has_no_process() {
        let mut table = ProcessTable::new(Arc::new(StringPool::new()));
        assert!(table.process_info(Pid(-1), true).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_create_on_demand() {
        let mut table = ProcessTable::new(Arc::new(StringPool::new()));
        assert!(table.process_info(Pid(5), false).is_none());
        assert!(table.process_info(Pid(5), true).is_some());
        assert!(table.process_info(Pid(5), false).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_devices_reach_existing_and_future_processes() {
        let strings = Arc::new(StringPool::new());
        let mut table = ProcessTable::new(Arc::clone(&strings));
        table.process_info(Pid(1), true);
        let device = MountDevice::parse_mounts_line(&strings, "/dev/sda1 / ext4 rw 0 0").unwrap();
        table.add_device(device);
        table.process_info(Pid(2), true);

        for pid in [Pid(1), Pid(2)] {
            assert_eq!(table.get(pid).unwrap().mount_namespace.devices().len(), 1);
        }
        assert_eq!(table.template().devices().len(), 1);
    }
}
