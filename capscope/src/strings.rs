//! Interned string pool
//!
//! Symbol names, binary paths, nicks and mount fields repeat heavily across a
//! capture. The pool hands out shared `Arc<str>` handles so each distinct
//! string is stored once and released when the last owner drops it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Deduplicating store of shared strings
///
/// One pool is owned per `Document`; it is never a process-wide static so
/// independent documents do not share state.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Mutex<HashSet<Arc<str>>>,
}

impl StringPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared handle for `s`, inserting it on first use
    pub fn intern(&self, s: &str) -> Arc<str> {
        let mut strings = self.strings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = strings.get(s) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(s);
        strings.insert(Arc::clone(&interned));
        interned
    }

    /// Number of distinct strings held
    pub fn len(&self) -> usize {
        self.strings.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
