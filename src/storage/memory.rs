//! In-memory metadata store backed by `DashMap`

use super::traits::{
    MetadataRecord, MetadataStore, Restriction, StorageError, StorageResult, UpsertOutcome,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;

/// Non-persistent store for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, MetadataRecord>,
    restrictions: Mutex<Vec<Restriction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryStore {
    fn upsert(&self, record: &MetadataRecord) -> StorageResult<UpsertOutcome> {
        match self.records.entry(record.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(UpsertOutcome::Inserted)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().analysis_timestamp > record.analysis_timestamp {
                    return Ok(UpsertOutcome::Stale);
                }
                slot.insert(record.clone());
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    fn load(&self, file_path: &str) -> StorageResult<Option<MetadataRecord>> {
        Ok(self
            .records
            .get(&super::record_id(file_path))
            .map(|r| r.value().clone()))
    }

    fn list(&self, limit: Option<usize>) -> StorageResult<Vec<MetadataRecord>> {
        let mut records: Vec<MetadataRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn count(&self) -> StorageResult<usize> {
        Ok(self.records.len())
    }

    fn record_restriction(&self, restriction: &Restriction) -> StorageResult<()> {
        self.restrictions
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(restriction.clone());
        Ok(())
    }

    fn restrictions(&self) -> StorageResult<Vec<Restriction>> {
        Ok(self
            .restrictions
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone())
    }
}
