use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// In-memory `id -> file path` map.
///
/// Entries are hints: the store re-reads the file and falls back to a full scan when a hint
/// turns out stale, so out-of-band edits to the tree never produce wrong answers.
#[derive(Debug, Default)]
pub struct IdIndex {
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl IdIndex {
    pub fn get(&self, id: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn insert(&self, id: String, path: PathBuf) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, path);
    }

    pub fn remove(&self, id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Swap in a freshly scanned map. The first path seen for an id wins.
    pub fn replace<I>(&self, scanned: I)
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        let mut fresh = HashMap::new();
        for (id, path) in scanned {
            fresh.entry(id).or_insert(path);
        }
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
