//! Resolved symbol value

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// What a symbol stands for in a call chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Root,
    Process,
    Thread,
    ContextSwitch,
    User,
    Kernel,
    Unwindable,
}

/// Immutable, cheaply clonable symbol
///
/// Identity is a hash of the name mixed with the binary's basename, compared
/// before the name itself. Two lookups of the same function merge; equally
/// named functions from different binaries stay apart unless their hashes
/// collide and the names match.
#[derive(Clone)]
pub struct Symbol {
    inner: Arc<SymbolInner>,
}

struct SymbolInner {
    name: Arc<str>,
    binary_path: Option<Arc<str>>,
    binary_nick: Option<Arc<str>>,
    begin: u64,
    end: u64,
    kind: SymbolKind,
    is_fallback: bool,
    hash: u32,
}

impl Symbol {
    /// Create a symbol covering `[begin, end)`
    ///
    /// An empty binary path or nick is treated as absent.
    #[must_use]
    pub fn new(
        name: Arc<str>,
        binary_path: Option<Arc<str>>,
        binary_nick: Option<Arc<str>>,
        begin: u64,
        end: u64,
        kind: SymbolKind,
    ) -> Self {
        Self::build(name, binary_path, binary_nick, begin, end, kind, false)
    }

    /// Create a placeholder symbol used when real resolution failed
    #[must_use]
    pub fn fallback(
        name: Arc<str>,
        binary_path: Option<Arc<str>>,
        binary_nick: Option<Arc<str>>,
        begin: u64,
        end: u64,
        kind: SymbolKind,
    ) -> Self {
        Self::build(name, binary_path, binary_nick, begin, end, kind, true)
    }

    fn build(
        name: Arc<str>,
        binary_path: Option<Arc<str>>,
        binary_nick: Option<Arc<str>>,
        begin: u64,
        end: u64,
        kind: SymbolKind,
        is_fallback: bool,
    ) -> Self {
        let binary_path = binary_path.filter(|path| !path.is_empty());
        let mut hash = str_hash(&name);
        if let Some(path) = binary_path.as_deref() {
            hash ^= str_hash(basename(path));
        }
        Self {
            inner: Arc::new(SymbolInner {
                name,
                binary_path,
                binary_nick: binary_nick.filter(|nick| !nick.is_empty()),
                begin,
                end,
                kind,
                is_fallback,
                hash,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn binary_path(&self) -> Option<&str> {
        self.inner.binary_path.as_deref()
    }

    #[must_use]
    pub fn binary_nick(&self) -> Option<&str> {
        self.inner.binary_nick.as_deref()
    }

    /// First address covered
    #[must_use]
    pub fn begin(&self) -> u64 {
        self.inner.begin
    }

    /// One past the last address covered
    #[must_use]
    pub fn end(&self) -> u64 {
        self.inner.end
    }

    #[must_use]
    pub fn kind(&self) -> SymbolKind {
        self.inner.kind
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.inner.is_fallback
    }

    #[must_use]
    pub fn is_context_switch(&self) -> bool {
        self.inner.kind == SymbolKind::ContextSwitch
    }

    /// Identity hash used for equality and hashing
    #[must_use]
    pub fn identity_hash(&self) -> u32 {
        self.inner.hash
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.hash == other.inner.hash && self.inner.name == other.inner.name)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.inner.hash);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name())
            .field("binary_path", &self.binary_path())
            .field("range", &format_args!("0x{:x}..0x{:x}", self.begin(), self.end()))
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binary_nick() {
            Some(nick) => write!(f, "{} [{nick}]", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Classic djb2 string hash over signed bytes
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn str_hash(s: &str) -> u32 {
    s.bytes().fold(5381u32, |h, c| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(i32::from(c as i8) as u32)
    })
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
