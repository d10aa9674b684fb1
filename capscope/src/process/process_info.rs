//! Everything known about one process in a capture

use super::address_layout::AddressLayout;
use super::namespace::MountNamespace;
use crate::domain::{Pid, Tid, Timestamp};
use crate::strings::StringPool;
use crate::symbols::{Symbol, SymbolKind};
use std::collections::BTreeSet;

const KERNEL_WORKER_PREFIXES: &[&str] =
    &["kworker/", "ksoftirqd/", "migration/", "dmcrypt_write/", "irq/", "hwrng", "rcu_"];

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub address_layout: AddressLayout,
    pub mount_namespace: MountNamespace,
    fallback_symbol: Symbol,
    symbol: Option<Symbol>,
    command_line: Option<String>,
    threads: BTreeSet<Tid>,
    /// Zero until an exit record is seen
    pub exit_time: Timestamp,
}

impl ProcessInfo {
    /// New process whose namespace starts with the template's devices
    #[must_use]
    pub fn new(strings: &StringPool, pid: Pid, template: &MountNamespace) -> Self {
        let name = strings.intern(&format!("Process {}", pid.0));
        let kind = if pid == Pid::KERNEL { SymbolKind::Kernel } else { SymbolKind::Process };
        Self {
            pid,
            address_layout: AddressLayout::new(),
            mount_namespace: template.copy(),
            fallback_symbol: Symbol::fallback(name, None, None, 0, 0, kind),
            symbol: None,
            command_line: None,
            threads: BTreeSet::new(),
            exit_time: Timestamp(0),
        }
    }

    #[must_use]
    pub fn is_kernel(&self) -> bool {
        self.pid == Pid::KERNEL
    }

    /// Resolved process symbol, or `"Process <pid>"` if none was recorded
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        self.symbol.as_ref().unwrap_or(&self.fallback_symbol)
    }

    #[must_use]
    pub fn fallback_symbol(&self) -> &Symbol {
        &self.fallback_symbol
    }

    #[must_use]
    pub fn has_resolved_symbol(&self) -> bool {
        self.symbol.is_some()
    }

    #[must_use]
    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    /// Adopt a recorded command line; its first word names the process
    ///
    /// Empty command lines are ignored.
    pub fn set_command_line(&mut self, strings: &StringPool, command_line: &str) {
        let command_line = command_line.trim_end_matches('\0');
        let Some(program) = command_line.split(' ').next().filter(|p| !p.is_empty()) else {
            return;
        };

        let kind = if is_kernel_worker(command_line) || self.is_kernel() {
            SymbolKind::Kernel
        } else {
            SymbolKind::Process
        };
        self.symbol = Some(Symbol::new(strings.intern(program), None, None, 0, 0, kind));
        self.command_line = Some(command_line.to_string());
    }

    pub fn add_thread(&mut self, tid: Tid) {
        self.threads.insert(tid);
    }

    /// Thread ids seen in samples and allocations, ascending
    pub fn threads(&self) -> impl Iterator<Item = Tid> + '_ {
        self.threads.iter().copied()
    }

    /// Synthetic symbol standing for one of this process's threads
    #[must_use]
    pub fn thread_symbol(&self, strings: &StringPool, tid: Tid) -> Symbol {
        let name = if tid.0 == self.pid.0 {
            format!("Thread-{} (Main)", tid.0)
        } else {
            format!("Thread-{}", tid.0)
        };
        Symbol::new(strings.intern(&name), None, None, 0, 0, SymbolKind::Thread)
    }
}

fn is_kernel_worker(command_line: &str) -> bool {
    KERNEL_WORKER_PREFIXES.iter().any(|prefix| command_line.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_symbol_until_command_line() {
        let strings = StringPool::new();
        let mut info = ProcessInfo::new(&strings, Pid(42), &MountNamespace::new());
        assert_eq!(info.symbol().name(), "Process 42");
        assert!(info.symbol().is_fallback());
        assert!(!info.has_resolved_symbol());

        info.set_command_line(&strings, "/usr/bin/foo bar baz");
        assert_eq!(info.symbol().name(), "/usr/bin/foo");
        assert_eq!(info.symbol().kind(), SymbolKind::Process);
        assert_eq!(info.command_line(), Some("/usr/bin/foo bar baz"));
        assert_eq!(info.fallback_symbol().name(), "Process 42");
    }

    #[test]
    fn test_empty_command_line_is_ignored() {
        let strings = StringPool::new();
        let mut info = ProcessInfo::new(&strings, Pid(7), &MountNamespace::new());
        info.set_command_line(&strings, "");
        assert!(!info.has_resolved_symbol());
        assert_eq!(info.command_line(), None);
    }

    #[test]
    fn test_kernel_workers_are_kernel_symbols() {
        let strings = StringPool::new();
        let mut info = ProcessInfo::new(&strings, Pid(120), &MountNamespace::new());
        info.set_command_line(&strings, "kworker/3:1-events");
        assert_eq!(info.symbol().kind(), SymbolKind::Kernel);

        let idle = ProcessInfo::new(&strings, Pid(0), &MountNamespace::new());
        assert!(idle.is_kernel());
        assert_eq!(idle.symbol().kind(), SymbolKind::Kernel);
    }

    #[test]
    fn test_thread_symbols() {
        let strings = StringPool::new();
        let mut info = ProcessInfo::new(&strings, Pid(100), &MountNamespace::new());
        info.add_thread(Tid(102));
        info.add_thread(Tid(101));
        info.add_thread(Tid(102));
        assert_eq!(info.threads().collect::<Vec<_>>(), vec![Tid(101), Tid(102)]);

        assert_eq!(info.thread_symbol(&strings, Tid(100)).name(), "Thread-100 (Main)");
        let worker = info.thread_symbol(&strings, Tid(101));
        assert_eq!(worker.name(), "Thread-101");
        assert_eq!(worker.kind(), SymbolKind::Thread);
    }
}
