//! Stack symbolizer
//!
//! Walks a traceable's address list innermost first. A sentinel address
//! stands in for the marker of the context the walk is leaving, then
//! switches the current context; every other address is looked up in the
//! kernel cache or the owning process's cache depending on that context.

use super::address::AddressContext;
use super::symbol::Symbol;
use super::table::SymbolTable;
use crate::domain::Pid;
use capscope_common::MAX_STACK_DEPTH;

/// Resolve up to `max_depth` addresses of a stack
///
/// Returns the symbols innermost first and the context reached after the
/// last address. Unresolvable addresses are dropped and repeated adjacent
/// symbols are collapsed. If the first resolved symbol is a context-switch
/// marker it is skipped; later markers are kept.
pub fn symbolize_stack(
    table: &SymbolTable,
    pid: Pid,
    addresses: impl IntoIterator<Item = u64>,
    max_depth: usize,
) -> (Vec<Symbol>, AddressContext) {
    let pid = if pid.is_valid() { pid } else { Pid::KERNEL };
    let mut context = AddressContext::None;
    let mut symbols: Vec<Symbol> = Vec::new();
    let mut first = true;

    for address in addresses.into_iter().take(max_depth.min(MAX_STACK_DEPTH)) {
        let resolved = match AddressContext::from_sentinel(address) {
            Some(next) => {
                let marker = table.context_switch(context.or_user());
                context = next;
                marker
            }
            None => table.lookup(pid, context.or_user(), address),
        };

        let Some(symbol) = resolved else { continue };
        if std::mem::take(&mut first) && symbol.is_context_switch() {
            continue;
        }
        if symbols.last() == Some(symbol) {
            continue;
        }
        symbols.push(symbol.clone());
    }

    (symbols, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringPool;
    use crate::symbols::SymbolKind;
    use capscope_common::context;
    use std::sync::Arc;

    fn table() -> SymbolTable {
        let strings = StringPool::new();
        let mut table = SymbolTable::new(&strings);
        let kernel = |name: &str, begin| {
            Symbol::new(Arc::from(name), None, None, begin, begin + 0x100, SymbolKind::Kernel)
        };
        let user = |name: &str, begin| {
            Symbol::new(
                Arc::from(name),
                Some(Arc::from("/usr/bin/app")),
                None,
                begin,
                begin + 0x100,
                SymbolKind::User,
            )
        };
        table.kernel_mut().insert(kernel("do_syscall_64", 0xffff_0000));
        table.kernel_mut().insert(kernel("entry_SYSCALL_64", 0xffff_1000));
        table.process_mut(Pid(10)).insert(user("write_all", 0x4000));
        table.process_mut(Pid(10)).insert(user("main", 0x5000));
        table
    }

    #[test]
    fn test_kernel_then_user_stack() {
        let table = table();
        let stack = [
            context::KERNEL,
            0xffff_0010,
            0xffff_1010,
            context::USER,
            0x4010,
            0x5010,
        ];
        let (symbols, final_context) = symbolize_stack(&table, Pid(10), stack, 64);
        let names: Vec<&str> = symbols.iter().map(Symbol::name).collect();
        assert_eq!(
            names,
            vec!["do_syscall_64", "entry_SYSCALL_64", "- - Kernel - -", "write_all", "main"]
        );
        assert_eq!(final_context, AddressContext::User);
    }

    #[test]
    fn test_marker_names_the_context_being_left() {
        let table = table();
        let stack = [0x4010, context::KERNEL, 0xffff_0010];
        let (symbols, final_context) = symbolize_stack(&table, Pid(10), stack, 64);
        let names: Vec<&str> = symbols.iter().map(Symbol::name).collect();
        // no sentinel seen yet counts as user
        assert_eq!(names, vec!["write_all", "- - User - -", "do_syscall_64"]);
        assert_eq!(final_context, AddressContext::Kernel);
    }

    #[test]
    fn test_only_the_first_leading_marker_is_skipped() {
        let table = table();
        let stack = [context::KERNEL, context::USER, 0x4010];
        let (symbols, _) = symbolize_stack(&table, Pid(10), stack, 64);
        let names: Vec<&str> = symbols.iter().map(Symbol::name).collect();
        assert_eq!(names, vec!["- - Kernel - -", "write_all"]);
    }

    #[test]
    fn test_consecutive_sentinels_each_emit_a_marker() {
        let table = table();
        let stack = [0x4010, context::KERNEL, context::HYPERVISOR, 0xffff_1010];
        let (symbols, final_context) = symbolize_stack(&table, Pid(10), stack, 64);
        let names: Vec<&str> = symbols.iter().map(Symbol::name).collect();
        assert_eq!(
            names,
            vec!["write_all", "- - User - -", "- - Kernel - -", "entry_SYSCALL_64"]
        );
        assert_eq!(final_context, AddressContext::Hypervisor);
    }

    #[test]
    fn test_hypervisor_uses_kernel_cache_and_guest_uses_process_cache() {
        let table = table();
        let (symbols, _) =
            symbolize_stack(&table, Pid(10), [context::HYPERVISOR, 0xffff_0010], 8);
        assert_eq!(symbols.iter().map(Symbol::name).collect::<Vec<_>>(), vec!["do_syscall_64"]);

        // guest addresses never hit the kernel cache
        let (symbols, final_context) =
            symbolize_stack(&table, Pid(10), [context::GUEST_KERNEL, 0xffff_0010, 0x4010], 8);
        assert_eq!(symbols.iter().map(Symbol::name).collect::<Vec<_>>(), vec!["write_all"]);
        assert_eq!(final_context, AddressContext::GuestKernel);
    }

    #[test]
    fn test_unresolved_and_repeated_addresses_are_dropped() {
        let table = table();
        let stack = [0x4010, 0x4020, 0x9999, 0x5010];
        let (symbols, final_context) = symbolize_stack(&table, Pid(10), stack, 64);
        let names: Vec<&str> = symbols.iter().map(Symbol::name).collect();
        assert_eq!(names, vec!["write_all", "main"]);
        assert_eq!(final_context, AddressContext::None);
    }

    #[test]
    fn test_depth_is_capped() {
        let table = table();
        let stack = [0x4010, 0x5010];
        let (symbols, _) = symbolize_stack(&table, Pid(10), stack, 1);
        assert_eq!(symbols.len(), 1);

        let long = std::iter::repeat([0x4010, 0x5010]).take(200).flatten();
        let (symbols, _) = symbolize_stack(&table, Pid(10), long, usize::MAX);
        assert_eq!(symbols.len(), MAX_STACK_DEPTH);
    }

    #[test]
    fn test_negative_pid_uses_kernel_process() {
        let table = table();
        let (symbols, _) = symbolize_stack(&table, Pid(-1), [context::KERNEL, 0xffff_0010], 8);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name(), "do_syscall_64");
    }
}
