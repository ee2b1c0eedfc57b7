//! Interned string pool.
//!
//! Append-only with stable indices. `intern` returns the existing index
//! for a string already present. The pool is internally synchronized:
//! runtime string concatenation interns fresh handles from worker
//! threads while other workers resolve.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type StrId = u32;

#[derive(Debug, Default)]
struct PoolInner {
    strings: Vec<Arc<str>>,
    index: HashMap<Arc<str>, StrId>,
}

#[derive(Debug, Default)]
pub struct StringPool {
    inner: RwLock<PoolInner>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pool from an ordered list (cache load). Index order is
    /// preserved exactly.
    pub fn from_strings(strings: impl IntoIterator<Item = String>) -> Self {
        let pool = Self::new();
        for s in strings {
            pool.intern(&s);
        }
        pool
    }

    /// Return the index of `s`, appending it if absent. Injective:
    /// equal strings share an index, distinct strings never do.
    pub fn intern(&self, s: &str) -> StrId {
        if let Some(&id) = self.inner.read().unwrap().index.get(s) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        // A racing writer may have added it between the read and write lock.
        if let Some(&id) = inner.index.get(s) {
            return id;
        }
        let id = inner.strings.len() as StrId;
        let entry: Arc<str> = Arc::from(s);
        inner.strings.push(entry.clone());
        inner.index.insert(entry, id);
        id
    }

    /// Resolve a handle. Handles are stable for the pool's lifetime.
    pub fn resolve(&self, id: StrId) -> Arc<str> {
        let inner = self.inner.read().unwrap();
        inner
            .strings
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in index order (cache write).
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .strings
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}
