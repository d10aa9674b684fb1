//! Symbolization phase
//!
//! Runs after load on a blocking worker. Every distinct address in every
//! traceable is resolved once and cached per process, or in the shared
//! kernel cache for kernel and hypervisor contexts. The finished table is
//! attached to the document with a single assignment; a cancelled or
//! failed run attaches nothing.

use super::Document;
use crate::capture::Frame;
use crate::domain::{DocumentError, Pid};
use crate::process::ProcessInfo;
use crate::strings::StringPool;
use crate::symbolization::Symbolizer;
use crate::symbols::{symbolize_stack, AddressContext, Symbol, SymbolKind, SymbolTable};
use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PROGRESS_INTERVAL: usize = 100;

impl Document {
    /// Resolve every traceable address and attach the resulting table
    ///
    /// # Errors
    /// Returns [`DocumentError::AlreadySymbolized`] if a table is already
    /// attached, [`DocumentError::Cancelled`] if `cancel` fires first, and
    /// [`DocumentError::TaskFailed`] if the worker panics. The document
    /// stays usable in every case.
    pub async fn symbolize<S>(
        self: &Arc<Self>,
        symbolizer: S,
        cancel: CancellationToken,
    ) -> Result<(), DocumentError>
    where
        S: Symbolizer + 'static,
    {
        self.symbolize_with_progress(symbolizer, cancel, |_, _| {}).await
    }

    /// Like [`symbolize`](Self::symbolize), reporting `(fraction, stage)`
    ///
    /// # Errors
    /// See [`symbolize`](Self::symbolize).
    pub async fn symbolize_with_progress<S, F>(
        self: &Arc<Self>,
        mut symbolizer: S,
        cancel: CancellationToken,
        progress: F,
    ) -> Result<(), DocumentError>
    where
        S: Symbolizer + 'static,
        F: Fn(f64, &str) + Send + 'static,
    {
        if self.symbols.get().is_some() {
            return Err(DocumentError::AlreadySymbolized);
        }

        let document = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let table = tokio::task::spawn_blocking(move || {
            document.build_symbol_table(&mut symbolizer, &worker_cancel, &progress)
        })
        .await
        .map_err(|e| DocumentError::TaskFailed(e.to_string()))??;

        if cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }

        info!("Resolved {} symbols", table.len());
        self.symbols.set(table).map_err(|_| DocumentError::AlreadySymbolized)
    }

    /// Blocking body of [`symbolize`](Self::symbolize)
    ///
    /// # Errors
    /// Returns [`DocumentError::Cancelled`] as soon as `cancel` fires.
    pub fn build_symbol_table(
        &self,
        symbolizer: &mut dyn Symbolizer,
        cancel: &CancellationToken,
        progress: &dyn Fn(f64, &str),
    ) -> Result<SymbolTable, DocumentError> {
        symbolizer.prepare(self);

        let mut table = SymbolTable::new(&self.strings);
        let traceables = self.traceables();
        let total = traceables.len();

        for (count, frame) in traceables.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!("Symbolization cancelled after {count} of {total} traceables");
                return Err(DocumentError::Cancelled);
            }

            let pid = if frame.pid().is_valid() { frame.pid() } else { Pid::KERNEL };
            if let Some(process) = self.processes.get(pid) {
                self.add_traceable(&mut table, symbolizer, process, &frame);
            }

            if (count + 1) % PROGRESS_INTERVAL == 0 {
                #[allow(clippy::cast_precision_loss)]
                progress((count + 1) as f64 / total as f64, "Symbolizing stack traces");
            }
        }

        Ok(table)
    }

    fn add_traceable(
        &self,
        table: &mut SymbolTable,
        symbolizer: &dyn Symbolizer,
        process: &ProcessInfo,
        frame: &Frame<'_>,
    ) {
        let Some(addresses) = frame.addresses() else { return };
        let mut context = AddressContext::None;

        for address in addresses.iter() {
            if let Some(next) = AddressContext::from_sentinel(address) {
                context = next;
                continue;
            }

            let cache = table.cache_for_mut(process.pid, context);
            if cache.lookup(address).is_some() {
                continue;
            }
            let resolved = symbolizer
                .symbolize(&self.strings, process, context, address)
                .or_else(|| in_file_fallback(&self.strings, process, address));
            if let Some(symbol) = resolved {
                cache.insert(symbol);
            }
        }
    }

    /// Attached symbol table, once symbolization has completed
    #[must_use]
    pub fn symbols(&self) -> Option<&SymbolTable> {
        self.symbols.get()
    }

    #[must_use]
    pub fn is_symbolized(&self) -> bool {
        self.symbols.get().is_some()
    }

    /// Symbols of a sample or allocation stack, innermost first
    ///
    /// Empty before symbolization, or for frames that carry no stack.
    #[must_use]
    pub fn symbolize_traceable(
        &self,
        frame: &Frame<'_>,
        max_depth: usize,
    ) -> (Vec<Symbol>, AddressContext) {
        match (self.symbols.get(), frame.addresses()) {
            (Some(table), Some(addresses)) => {
                symbolize_stack(table, frame.pid(), addresses.iter(), max_depth)
            }
            _ => (Vec::new(), AddressContext::None),
        }
    }

    /// Symbol for a single address as seen from `context` inside `pid`
    #[must_use]
    pub fn lookup_symbol(&self, pid: Pid, context: AddressContext, address: u64) -> Option<&Symbol> {
        let pid = if pid.is_valid() { pid } else { Pid::KERNEL };
        self.symbols.get()?.lookup(pid, context.or_user(), address)
    }
}

/// Placeholder naming the mapped file and offset of an unresolved address
fn in_file_fallback(strings: &StringPool, process: &ProcessInfo, address: u64) -> Option<Symbol> {
    let map = process.address_layout.lookup(address)?;
    let name = format!("In File {}+0x{:x}", map.file, map.file_offset(address));
    Some(Symbol::fallback(
        strings.intern(&name),
        Some(Arc::clone(&map.file)),
        None,
        address,
        address + 1,
        SymbolKind::User,
    ))
}
