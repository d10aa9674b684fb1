//! User-space symbols from ELF binaries on disk
//!
//! Addresses are taken back to the file they were mapped from through the
//! process's address layout, then that path is translated through the
//! process's mount namespace so containerized binaries are found on the
//! host. Names come from DWARF when the binary carries it and from the ELF
//! symbol tables otherwise.

use super::Symbolizer;
use crate::document::Document;
use crate::process::{MemoryMap, ProcessInfo};
use crate::strings::StringPool;
use crate::symbols::{AddressContext, Symbol, SymbolKind};
use addr2line::Context;
use anyhow::{Context as _, Result};
use capscope_common::JITMAP_MARK;
use gimli::{EndianArcSlice, RunTimeEndian};
use log::{debug, warn};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol};
use rustc_demangle::demangle;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// A function symbol from `.symtab` or `.dynsym`
#[derive(Debug, Clone)]
struct ElfSymbol {
    address: u64,
    size: u64,
    name: String,
}

/// A `PT_LOAD` segment: where a file range lands in the virtual address space
#[derive(Debug, Clone, Copy)]
struct LoadSegment {
    file_offset: u64,
    file_size: u64,
    address: u64,
}

/// Everything needed from one binary, detached from its bytes
struct ElfImage {
    dwarf: Option<Context<EndianArcSlice<RunTimeEndian>>>,
    /// Sorted by address
    symbols: Vec<ElfSymbol>,
    segments: Vec<LoadSegment>,
}

impl ElfImage {
    fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).context("Failed to read binary file")?;
        let file = object::File::parse(&*data).context("Failed to parse object file")?;

        let endian =
            if file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };
        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };
        let dwarf = gimli::Dwarf::load(&load_section)?;
        let dwarf = match Context::from_dwarf(dwarf) {
            Ok(context) => Some(context),
            Err(e) => {
                debug!("No usable DWARF in {}: {e}", path.display());
                None
            }
        };

        let mut symbols: Vec<ElfSymbol> = file
            .symbols()
            .chain(file.dynamic_symbols())
            .filter(|s| {
                s.kind() == object::SymbolKind::Text && s.is_definition() && s.address() != 0
            })
            .filter_map(|s| {
                let name = s.name().ok()?.to_string();
                Some(ElfSymbol { address: s.address(), size: s.size(), name })
            })
            .collect();
        symbols.sort_by_key(|s| s.address);
        symbols.dedup_by_key(|s| s.address);

        let segments = file
            .segments()
            .map(|segment| {
                let (file_offset, file_size) = segment.file_range();
                LoadSegment { file_offset, file_size, address: segment.address() }
            })
            .collect();

        Ok(Self { dwarf, symbols, segments })
    }

    /// Virtual address the bytes at `file_offset` are loaded at
    fn address_for(&self, file_offset: u64) -> u64 {
        self.segments
            .iter()
            .find(|s| file_offset >= s.file_offset && file_offset - s.file_offset < s.file_size)
            .map_or(file_offset, |s| s.address.saturating_add(file_offset - s.file_offset))
    }

    /// Outermost function covering `address` according to DWARF
    fn dwarf_name(&self, address: u64) -> Option<String> {
        let context = self.dwarf.as_ref()?;
        let mut frames = context.find_frames(address).skip_all_loads().ok()?;
        let mut name = None;
        while let Ok(Some(frame)) = frames.next() {
            if let Some(demangled) =
                frame.function.and_then(|f| f.demangle().ok().map(std::borrow::Cow::into_owned))
            {
                name = Some(demangled);
            }
        }
        name
    }

    fn symbol_at(&self, address: u64) -> Option<&ElfSymbol> {
        let slot = self.symbols.partition_point(|s| s.address <= address).checked_sub(1)?;
        let symbol = &self.symbols[slot];
        (symbol.size == 0 || address - symbol.address < symbol.size).then_some(symbol)
    }

    /// Name and `[begin, end)` virtual range of the function at `address`
    fn resolve(&self, address: u64) -> Option<(String, u64, u64)> {
        let symbol = self.symbol_at(address);
        let name = self
            .dwarf_name(address)
            .or_else(|| symbol.map(|s| format!("{:#}", demangle(&s.name))))?;
        let (begin, end) = match symbol {
            Some(s) if s.size > 0 => (s.address, s.address.saturating_add(s.size)),
            _ => (address, address.saturating_add(1)),
        };
        Some((name, begin, end))
    }
}

/// Resolves user-space addresses against the binaries they were mapped from
///
/// Each translated path is loaded at most once; failures are remembered so
/// a missing binary is not retried for every address.
#[derive(Default)]
pub struct ElfSymbolizer {
    images: RefCell<HashMap<String, Option<ElfImage>>>,
}

impl ElfSymbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` unless it was tried before; true if an image is available
    fn ensure_loaded(&self, path: &str) -> bool {
        if let Some(image) = self.images.borrow().get(path) {
            return image.is_some();
        }

        let host_path = Path::new(path);
        let image = if host_path.is_file() {
            match ElfImage::load(host_path) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Failed to load symbols from {path}: {e:#}");
                    None
                }
            }
        } else {
            debug!("{path} is not present on this host");
            None
        };

        let loaded = image.is_some();
        self.images.borrow_mut().insert(path.to_string(), image);
        loaded
    }

    fn resolve_in_map(
        &self,
        strings: &StringPool,
        process: &ProcessInfo,
        map: &MemoryMap,
        address: u64,
    ) -> Option<Symbol> {
        let file_offset = map.file_offset(address);

        for candidate in process.mount_namespace.translate(&map.file) {
            if !self.ensure_loaded(&candidate) {
                continue;
            }
            let images = self.images.borrow();
            let Some(Some(image)) = images.get(&candidate) else { continue };

            let vaddr = image.address_for(file_offset);
            let (name, begin, end) = image.resolve(vaddr)?;

            // Back to file offsets, clamped to the mapping, then to runtime
            let delta = file_offset.wrapping_sub(vaddr);
            let lowest = map.offset;
            let highest = map.offset + (map.end - map.start);
            let begin = begin.wrapping_add(delta).clamp(lowest, highest);
            let mut end = end.wrapping_add(delta).clamp(lowest, highest);
            if end == begin {
                end = end.saturating_add(1);
            }

            return Some(Symbol::new(
                strings.intern(&name),
                Some(Arc::clone(&map.file)),
                Some(strings.intern(nick_for(&map.file))),
                map.start + (begin - map.offset),
                map.start + (end - map.offset),
                SymbolKind::User,
            ));
        }
        None
    }
}

/// Short display name for a binary: its file name
fn nick_for(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Mappings that never correspond to a file on disk
fn is_pseudo_file(path: &str) -> bool {
    path.is_empty() || path.starts_with('[') || path.starts_with("//anon")
}

impl Symbolizer for ElfSymbolizer {
    fn prepare(&mut self, _document: &Document) {}

    fn symbolize(
        &self,
        strings: &StringPool,
        process: &ProcessInfo,
        context: AddressContext,
        address: u64,
    ) -> Option<Symbol> {
        if !matches!(context, AddressContext::None | AddressContext::User) {
            return None;
        }
        if address & 0xFFFF_FFFF_0000_0000 == JITMAP_MARK {
            return None;
        }

        let map = process.address_layout.lookup(address)?;
        if is_pseudo_file(&map.file) {
            return None;
        }
        self.resolve_in_map(strings, process, map, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pid, Timestamp};
    use crate::process::MountNamespace;

    impl ElfImage {
        /// Inverse of `address_for`
        fn file_offset_for(&self, address: u64) -> Option<u64> {
            self.segments
                .iter()
                .find(|s| address >= s.address && address - s.address < s.file_size)
                .map(|s| s.file_offset + (address - s.address))
        }
    }

    fn process_with_map(strings: &StringPool, file: &str, start: u64, len: u64) -> ProcessInfo {
        let mut process = ProcessInfo::new(strings, Pid(9), &MountNamespace::new());
        process.address_layout.add(MemoryMap {
            start,
            end: start + len,
            offset: 0,
            inode: 0,
            file: strings.intern(file),
            time: Timestamp(0),
        });
        process.address_layout.sort();
        process
    }

    #[test]
    fn test_resolves_function_in_own_binary() {
        let exe = std::env::current_exe().unwrap();
        let exe = exe.to_str().unwrap();
        let image = ElfImage::load(Path::new(exe)).unwrap();
        let target = image.symbols.iter().find(|s| s.size > 16).unwrap();
        let file_offset = image.file_offset_for(target.address).unwrap();

        let strings = StringPool::new();
        let base = 0x5500_0000_0000;
        let process = process_with_map(&strings, exe, base, 1 << 32);
        let address = base + file_offset + 4;

        let symbolizer = ElfSymbolizer::new();
        let symbol =
            symbolizer.symbolize(&strings, &process, AddressContext::User, address).unwrap();
        assert!(!symbol.is_fallback());
        assert_eq!(symbol.kind(), SymbolKind::User);
        assert_eq!(symbol.binary_path(), Some(exe));
        assert_eq!(symbol.binary_nick(), Some(nick_for(exe)));
        assert!(symbol.begin() <= address && address < symbol.end());
    }

    #[test]
    fn test_ranges_near_top_of_address_space_saturate() {
        let image = ElfImage {
            dwarf: None,
            symbols: vec![
                ElfSymbol { address: u64::MAX - 4, size: 64, name: "corrupt".to_string() },
            ],
            segments: vec![LoadSegment {
                file_offset: 0,
                file_size: 0x100,
                address: u64::MAX - 8,
            }],
        };
        assert_eq!(
            image.resolve(u64::MAX - 2),
            Some(("corrupt".to_string(), u64::MAX - 4, u64::MAX))
        );
        assert_eq!(image.address_for(0x20), u64::MAX);

        let unsized_symbol = ElfImage {
            dwarf: None,
            symbols: vec![ElfSymbol { address: u64::MAX, size: 0, name: "edge".to_string() }],
            segments: Vec::new(),
        };
        assert_eq!(
            unsized_symbol.resolve(u64::MAX),
            Some(("edge".to_string(), u64::MAX, u64::MAX))
        );
    }

    #[test]
    fn test_missing_binary_resolves_nothing() {
        let strings = StringPool::new();
        let process = process_with_map(&strings, "/nonexistent/capscope/bin", 0x1000, 0x1000);
        let symbolizer = ElfSymbolizer::new();
        assert!(symbolizer.symbolize(&strings, &process, AddressContext::User, 0x1800).is_none());
        // remembered as missing
        assert!(matches!(
            symbolizer.images.borrow().get("/nonexistent/capscope/bin"),
            Some(None)
        ));
    }

    #[test]
    fn test_skips_kernel_jit_and_pseudo_mappings() {
        let strings = StringPool::new();
        let process = process_with_map(&strings, "[vdso]", 0x1000, 0x1000);
        let symbolizer = ElfSymbolizer::new();
        assert!(symbolizer.symbolize(&strings, &process, AddressContext::User, 0x1800).is_none());
        assert!(symbolizer
            .symbolize(&strings, &process, AddressContext::Kernel, 0x1800)
            .is_none());
        assert!(symbolizer
            .symbolize(&strings, &process, AddressContext::User, JITMAP_MARK | 1)
            .is_none());
        assert!(symbolizer.images.borrow().is_empty());
    }

    #[test]
    fn test_nick_is_basename() {
        assert_eq!(nick_for("/usr/lib64/libc.so.6"), "libc.so.6");
        assert_eq!(nick_for("app"), "app");
    }
}
