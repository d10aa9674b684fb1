//! # Symbolizers
//!
//! A symbolizer turns one raw address into a [`Symbol`]. The document's
//! symbolization pass feeds it every distinct address found in samples and
//! allocations, together with the owning process and the execution context
//! the address was captured in.
//!
//! ## Resolution Flow
//!
//! ```text
//! address + context + ProcessInfo
//!     │
//!     ├──► JitmapSymbolizer    ← 0xE000.. ids published by JIT runtimes
//!     │
//!     ├──► KallsymsSymbolizer  ← kernel context, /proc/kallsyms from the capture
//!     │
//!     └──► ElfSymbolizer       ← user context:
//!            address layout ─► mapped file ─► mount namespace translation
//!            ─► ELF on disk ─► file offset ─► virtual address
//!            ─► DWARF (addr2line) or ELF symbol table ─► demangled name
//! ```
//!
//! [`MultiSymbolizer`] chains these; the first one that answers wins.
//! Anything left unresolved in a user context falls back to an
//! `"In File <path>+0x<offset>"` placeholder, built by the document.
//!
//! ## Key Modules
//!
//! - **`elf`**: on-disk ELF and DWARF symbol resolution
//! - **`jitmap`**: names published through jitmap records
//! - **`kallsyms`**: kernel symbols from the captured `/proc/kallsyms`

pub mod elf;
pub mod jitmap;
pub mod kallsyms;

pub use elf::ElfSymbolizer;
pub use jitmap::JitmapSymbolizer;
pub use kallsyms::KallsymsSymbolizer;

use crate::document::Document;
use crate::process::ProcessInfo;
use crate::strings::StringPool;
use crate::symbols::{AddressContext, Symbol};

/// Address → symbol resolver plugged into [`Document::symbolize`]
///
/// `prepare` runs once, before any lookup, with the loaded document; it is
/// where a symbolizer reads whatever it needs out of the capture. Problems
/// found there are logged and leave the symbolizer resolving nothing.
pub trait Symbolizer: Send {
    fn prepare(&mut self, document: &Document);

    fn symbolize(
        &self,
        strings: &StringPool,
        process: &ProcessInfo,
        context: AddressContext,
        address: u64,
    ) -> Option<Symbol>;
}

/// Resolves nothing; only fallback symbols are produced
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbolizer;

impl Symbolizer for NoSymbolizer {
    fn prepare(&mut self, _document: &Document) {}

    fn symbolize(
        &self,
        _strings: &StringPool,
        _process: &ProcessInfo,
        _context: AddressContext,
        _address: u64,
    ) -> Option<Symbol> {
        None
    }
}

/// Ordered chain of symbolizers
#[derive(Default)]
pub struct MultiSymbolizer {
    symbolizers: Vec<Box<dyn Symbolizer>>,
}

impl MultiSymbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `symbolizer`; earlier ones are asked first
    pub fn add<S: Symbolizer + 'static>(&mut self, symbolizer: S) {
        self.symbolizers.push(Box::new(symbolizer));
    }

    /// Builder form of [`add`](Self::add)
    #[must_use]
    pub fn with<S: Symbolizer + 'static>(mut self, symbolizer: S) -> Self {
        self.add(symbolizer);
        self
    }

    /// Jitmap, kallsyms and ELF resolution, in that order
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(JitmapSymbolizer::new())
            .with(KallsymsSymbolizer::new())
            .with(ElfSymbolizer::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbolizers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbolizers.is_empty()
    }
}

impl Symbolizer for MultiSymbolizer {
    fn prepare(&mut self, document: &Document) {
        for symbolizer in &mut self.symbolizers {
            symbolizer.prepare(document);
        }
    }

    fn symbolize(
        &self,
        strings: &StringPool,
        process: &ProcessInfo,
        context: AddressContext,
        address: u64,
    ) -> Option<Symbol> {
        self.symbolizers
            .iter()
            .find_map(|symbolizer| symbolizer.symbolize(strings, process, context, address))
    }
}
