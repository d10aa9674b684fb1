//! # Symbols
//!
//! Values and lookup structures for resolved symbols.
//!
//! - [`Symbol`]: immutable name + binary + address range, with a
//!   collision-safe identity (hash first, then name)
//! - [`SymbolCache`]: augmented AVL interval tree for point lookups
//! - [`SymbolTable`]: the kernel cache, one cache per process, and the
//!   context-switch marker symbols
//! - [`symbolize_stack`]: turns an address list into ordered symbols
//!
//! ```text
//! [KERNEL, k1, k2, USER, u1, u2]
//!     │     │   │    │    │   │
//!     │     └───┴────┼────┼───┼──► kernel cache
//!     │              │    └───┴──► process cache (by pid)
//!     └──────────────┴───────────► context state + marker symbols
//! ```

pub mod address;
pub mod cache;
pub mod stack;
pub mod symbol;
pub mod table;

pub use address::{is_context_switch, AddressContext};
pub use cache::SymbolCache;
pub use stack::symbolize_stack;
pub use symbol::{str_hash, Symbol, SymbolKind};
pub use table::SymbolTable;
