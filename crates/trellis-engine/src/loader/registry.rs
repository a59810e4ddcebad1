//! Registry of all load records for one loader.

use std::sync::Arc;

use dashmap::DashMap;

use trellis_sdk::ModuleId;

use crate::loader::record::LoadRecord;

/// Map from canonical module identifier to its load record.
///
/// Guarantees at most one record per identifier for the life of the loader.
/// Records are never pruned; teardown happens by dropping the loader.
pub(crate) struct Registry {
    records: DashMap<ModuleId, Arc<LoadRecord>>,
}

impl Registry {
    /// Create a new empty registry.
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Get the record for `id`, creating and registering a fresh one if
    /// absent. The flag is true when this call created the record, so the
    /// caller can kick off instantiation exactly once.
    pub(crate) fn get_or_insert(&self, id: &ModuleId) -> (Arc<LoadRecord>, bool) {
        let mut created = false;
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                LoadRecord::new(id.clone())
            })
            .clone();
        (record, created)
    }

    /// Get a record by identifier.
    pub(crate) fn get(&self, id: &ModuleId) -> Option<Arc<LoadRecord>> {
        self.records.get(id).map(|entry| entry.clone())
    }

    pub(crate) fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All registered identifiers, sorted for stable output.
    pub(crate) fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self
            .records
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
