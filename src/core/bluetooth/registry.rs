//! Platform handles of the devices reported by the most recent scan

use std::collections::HashMap;

/// Maps advertiser ids to platform handles. Each scan starts a new generation and
/// forgets the previous one, so the map never outgrows a single scan round.
#[derive(Debug)]
pub(crate) struct ScanRegistry<T> {
    generation: u64,
    entries: HashMap<String, T>,
}

impl<T: Clone> ScanRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            generation: 0,
            entries: HashMap::new(),
        }
    }

    /// Drops every entry and returns the generation of the new scan
    pub(crate) fn begin_scan(&mut self) -> u64 {
        self.generation += 1;
        self.entries.clear();
        self.generation
    }

    /// Records `handle` unless `generation` belongs to a superseded scan
    pub(crate) fn insert(&mut self, generation: u64, id: String, handle: T) -> bool {
        if generation != self.generation {
            return false;
        }
        self.entries.insert(id, handle);
        true
    }

    pub(crate) fn get(&self, id: &str) -> Option<T> {
        self.entries.get(id).cloned()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
