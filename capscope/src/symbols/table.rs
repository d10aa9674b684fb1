//! Resolved symbol table attached to a document after symbolization

use super::address::AddressContext;
use super::cache::SymbolCache;
use super::symbol::{Symbol, SymbolKind};
use crate::domain::Pid;
use crate::strings::StringPool;
use std::collections::HashMap;

/// Per-process symbol caches plus the shared kernel cache
pub struct SymbolTable {
    kernel: SymbolCache,
    processes: HashMap<Pid, SymbolCache>,
    context_switches: Vec<(AddressContext, Symbol)>,
}

impl SymbolTable {
    #[must_use]
    pub fn new(strings: &StringPool) -> Self {
        let nick = strings.intern("Context Switch");
        let context_switches = AddressContext::SWITCHABLE
            .iter()
            .map(|&context| {
                let name = strings.intern(&format!("- - {} - -", context.label()));
                let symbol = Symbol::new(
                    name,
                    None,
                    Some(nick.clone()),
                    0,
                    0,
                    SymbolKind::ContextSwitch,
                );
                (context, symbol)
            })
            .collect();

        Self { kernel: SymbolCache::new(), processes: HashMap::new(), context_switches }
    }

    /// Cache shared by every process for kernel and hypervisor addresses
    #[must_use]
    pub fn kernel(&self) -> &SymbolCache {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut SymbolCache {
        &mut self.kernel
    }

    #[must_use]
    pub fn process(&self, pid: Pid) -> Option<&SymbolCache> {
        self.processes.get(&pid)
    }

    /// Cache for `pid`, created empty on first use
    pub fn process_mut(&mut self, pid: Pid) -> &mut SymbolCache {
        self.processes.entry(pid).or_default()
    }

    /// Cache that serves `context` for `pid`
    pub fn cache_for_mut(&mut self, pid: Pid, context: AddressContext) -> &mut SymbolCache {
        if context.uses_kernel_symbols() {
            &mut self.kernel
        } else {
            self.process_mut(pid)
        }
    }

    /// Marker symbol emitted where a stack switches into `context`
    #[must_use]
    pub fn context_switch(&self, context: AddressContext) -> Option<&Symbol> {
        self.context_switches.iter().find(|(c, _)| *c == context).map(|(_, symbol)| symbol)
    }

    /// Resolve `address` as seen from `context` inside `pid`
    #[must_use]
    pub fn lookup(&self, pid: Pid, context: AddressContext, address: u64) -> Option<&Symbol> {
        if context.uses_kernel_symbols() {
            self.kernel.lookup(address)
        } else {
            self.process(pid)?.lookup(address)
        }
    }

    /// Total number of cached symbols across all caches
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernel.len() + self.processes.values().map(SymbolCache::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_context_switch_symbols_are_named() {
        let strings = StringPool::new();
        let table = SymbolTable::new(&strings);
        let kernel = table.context_switch(AddressContext::Kernel).unwrap();
        assert_eq!(kernel.name(), "- - Kernel - -");
        assert_eq!(kernel.binary_nick(), Some("Context Switch"));
        assert!(kernel.is_context_switch());
        assert_eq!(
            table.context_switch(AddressContext::GuestUser).map(Symbol::name),
            Some("- - Guest User - -")
        );
        assert!(table.context_switch(AddressContext::None).is_none());
    }

    #[test]
    fn test_lookup_routes_by_context() {
        let strings = StringPool::new();
        let mut table = SymbolTable::new(&strings);
        let k = Symbol::new(Arc::from("schedule"), None, None, 0x100, 0x200, SymbolKind::Kernel);
        let u = Symbol::new(Arc::from("main"), None, None, 0x100, 0x200, SymbolKind::User);
        table.cache_for_mut(Pid(7), AddressContext::Kernel).insert(k);
        table.cache_for_mut(Pid(7), AddressContext::User).insert(u);

        assert_eq!(
            table.lookup(Pid(7), AddressContext::Kernel, 0x150).map(Symbol::name),
            Some("schedule")
        );
        assert_eq!(
            table.lookup(Pid(7), AddressContext::User, 0x150).map(Symbol::name),
            Some("main")
        );
        assert!(table.lookup(Pid(8), AddressContext::User, 0x150).is_none());
        assert_eq!(table.len(), 2);
    }
}
