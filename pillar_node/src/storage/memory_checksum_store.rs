use super::{ChecksumEntry, ChecksumStore};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Checksum cache held in a concurrent map
#[derive(Default)]
pub struct MemoryChecksumStore {
    entries: DashMap<(String, String), ChecksumEntry>,
}

impl MemoryChecksumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ChecksumStore for MemoryChecksumStore {
    async fn get_entry(&self, collection_id: &str, file_id: &str) -> Result<Option<ChecksumEntry>> {
        Ok(self
            .entries
            .get(&(collection_id.to_string(), file_id.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn put_entry(&self, entry: ChecksumEntry) -> Result<()> {
        self.entries.insert(
            (entry.collection_id.clone(), entry.file_id.clone()),
            entry,
        );
        Ok(())
    }

    async fn delete_entry(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(&(collection_id.to_string(), file_id.to_string()))
            .is_some())
    }

    async fn list_entries(&self, collection_id: &str) -> Result<Vec<ChecksumEntry>> {
        let mut entries: Vec<ChecksumEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.collection_id == collection_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            a.calculation_date
                .cmp(&b.calculation_date)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(entries)
    }
}
