//! Symbols published by JIT runtimes through jitmap records

use super::Symbolizer;
use crate::capture::Record;
use crate::document::Document;
use crate::process::ProcessInfo;
use crate::strings::StringPool;
use crate::symbols::{AddressContext, Symbol, SymbolKind};
use capscope_common::JITMAP_MARK;
use log::debug;
use std::sync::Arc;

const JITMAP_MASK: u64 = 0xFFFF_FFFF_0000_0000;

/// Exact-address lookup of jitmap names
#[derive(Debug, Default)]
pub struct JitmapSymbolizer {
    /// Sorted by address
    entries: Vec<(u64, Arc<str>)>,
    nick: Option<Arc<str>>,
}

impl JitmapSymbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, address: u64) -> Option<&Arc<str>> {
        // Producers number ids from 1 upward, so the id is usually the slot
        let guess = usize::try_from(address & 0xFFFF).ok().and_then(|id| id.checked_sub(1));
        if let Some((found, name)) = guess.and_then(|slot| self.entries.get(slot)) {
            if *found == address {
                return Some(name);
            }
        }
        self.entries
            .binary_search_by_key(&address, |(a, _)| *a)
            .ok()
            .map(|slot| &self.entries[slot].1)
    }
}

impl Symbolizer for JitmapSymbolizer {
    fn prepare(&mut self, document: &Document) {
        let strings = document.strings();
        for frame in document.jitmaps().iter() {
            let Record::Jitmap(jitmap) = &frame.record else { continue };
            self.entries.extend(
                jitmap.entries.iter().map(|(address, name)| (*address, strings.intern(name))),
            );
        }
        self.entries.sort_by_key(|(address, _)| *address);
        self.nick = Some(strings.intern("JIT"));
        debug!("Loaded {} jitmap entries", self.entries.len());
    }

    fn symbolize(
        &self,
        _strings: &StringPool,
        _process: &ProcessInfo,
        context: AddressContext,
        address: u64,
    ) -> Option<Symbol> {
        if !matches!(context, AddressContext::None | AddressContext::User) {
            return None;
        }
        if address & JITMAP_MASK != JITMAP_MARK {
            return None;
        }
        let name = self.find(address)?;
        Some(Symbol::new(
            Arc::clone(name),
            None,
            self.nick.clone(),
            address,
            address + 1,
            SymbolKind::User,
        ))
    }
}
