//! Kernel symbols from the `/proc/kallsyms` snapshot embedded in a capture

use super::Symbolizer;
use crate::document::Document;
use crate::process::ProcessInfo;
use crate::strings::StringPool;
use crate::symbols::{AddressContext, Symbol, SymbolKind};
use log::{debug, warn};
use rustc_demangle::demangle;
use std::sync::Arc;

/// Assumed size of the highest kernel symbol
const LAST_SYMBOL_LEN: u64 = 0xffff;

/// Sorted kernel symbol starts; each one ends where the next begins
#[derive(Debug, Default)]
pub struct KallsymsSymbolizer {
    symbols: Vec<(u64, Arc<str>)>,
    nick: Option<Arc<str>>,
}

impl KallsymsSymbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build directly from kallsyms text instead of the capture's copy
    #[must_use]
    pub fn from_text(strings: &StringPool, text: &str) -> Self {
        let mut symbolizer = Self::new();
        symbolizer.load(strings, text);
        symbolizer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn load(&mut self, strings: &StringPool, text: &str) {
        let mut last_address = 0;
        let mut skipped = 0usize;

        for line in text.lines() {
            let Some((address, name)) = parse_line(line) else {
                skipped += 1;
                continue;
            };
            // kallsyms repeats aliases of one address back to back
            if address != last_address {
                let name = if name.starts_with("_RN") || name.starts_with("_ZN") {
                    strings.intern(&format!("{:#}", demangle(name)))
                } else {
                    strings.intern(name)
                };
                self.symbols.push((address, name));
            }
            last_address = address;
        }

        // Stable sort; the first symbol listed at an address keeps it
        self.symbols.sort_by_key(|(address, _)| *address);
        self.symbols.dedup_by_key(|(address, _)| *address);
        self.nick = Some(strings.intern("Kernel"));

        if skipped > 0 {
            debug!("Skipped {skipped} malformed kallsyms lines");
        }
    }

    /// Symbol covering `address` with its `[begin, end)` range
    fn find(&self, address: u64) -> Option<(u64, u64, &Arc<str>)> {
        let (first, _) = self.symbols.first()?;
        let (last, _) = self.symbols.last()?;
        if address < *first || address >= last.saturating_add(LAST_SYMBOL_LEN) {
            return None;
        }

        let slot = self.symbols.partition_point(|(start, _)| *start <= address).checked_sub(1)?;
        let (begin, name) = &self.symbols[slot];
        let end = self
            .symbols
            .get(slot + 1)
            .map_or_else(|| begin.saturating_add(LAST_SYMBOL_LEN), |(next, _)| *next);
        Some((*begin, end, name))
    }
}

/// `address type name [module]`
fn parse_line(line: &str) -> Option<(u64, &str)> {
    let mut fields = line.split_ascii_whitespace();
    let address = u64::from_str_radix(fields.next()?, 16).ok()?;
    let kind = fields.next()?;
    if kind.len() != 1 {
        return None;
    }
    let name = fields.next()?;
    Some((address, name))
}

impl Symbolizer for KallsymsSymbolizer {
    fn prepare(&mut self, document: &Document) {
        if !self.symbols.is_empty() {
            return;
        }
        let Some(file) = document.lookup_file("/proc/kallsyms") else {
            debug!("Capture has no /proc/kallsyms, kernel addresses stay unresolved");
            return;
        };
        match file.read_to_string() {
            Ok(text) => self.load(document.strings(), &text),
            Err(e) => warn!("Could not read /proc/kallsyms from capture: {e}"),
        }
        debug!("Loaded {} kernel symbols", self.symbols.len());
    }

    fn symbolize(
        &self,
        strings: &StringPool,
        _process: &ProcessInfo,
        context: AddressContext,
        address: u64,
    ) -> Option<Symbol> {
        if context != AddressContext::Kernel || self.symbols.is_empty() {
            return None;
        }

        let nick = self.nick.clone();
        Some(match self.find(address) {
            Some((begin, end, name)) => {
                Symbol::new(Arc::clone(name), None, nick, begin, end, SymbolKind::Kernel)
            }
            None => Symbol::fallback(
                strings.intern(&format!("In Kernel+0x{address:x}")),
                None,
                nick,
                address,
                address.saturating_add(1),
                SymbolKind::Kernel,
            ),
        })
    }
}
