//! Side table of process-local mapping state
//!
//! The handle is a value shared across address spaces; what this process
//! knows about its own mappings lives here, keyed by the stable buffer id,
//! so "is this buffer mapped locally" never depends on trusting a field a
//! remote sender could have set.

use std::collections::HashMap;

/// Process-local mapping state for one registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalMapping {
    pub base: u64,
    pub attr_base: u64,
    pub size: u32,
}

/// Buffer id to local mapping state. Guarded by the mapper's mutex.
#[derive(Debug, Default)]
pub(crate) struct MappingTable {
    entries: HashMap<u64, LocalMapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, buffer_id: u64, mapping: LocalMapping) {
        self.entries.insert(buffer_id, mapping);
    }

    pub fn remove(&mut self, buffer_id: u64) -> Option<LocalMapping> {
        self.entries.remove(&buffer_id)
    }

    pub fn get(&self, buffer_id: u64) -> Option<&LocalMapping> {
        self.entries.get(&buffer_id)
    }

    pub fn contains(&self, buffer_id: u64) -> bool {
        self.entries.contains_key(&buffer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
