use super::{FileArchive, FileReader};
use crate::error::{PillarError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredFile {
    content: Bytes,
    modified: DateTime<Utc>,
}

type FileKey = (String, String);

fn key(collection_id: &str, file_id: &str) -> FileKey {
    (collection_id.to_string(), file_id.to_string())
}

/// Archive keeping every file in memory.
///
/// Used for tests and for checksum-only deployments that still want a
/// throwaway byte store. The capacity is a fixed byte budget.
pub struct MemoryArchive {
    files: DashMap<FileKey, StoredFile>,
    staged: DashMap<FileKey, Bytes>,
    retained: Mutex<Vec<(FileKey, Bytes)>>,
    capacity: AtomicU64,
}

impl MemoryArchive {
    pub fn new(capacity: u64) -> Self {
        Self {
            files: DashMap::new(),
            staged: DashMap::new(),
            retained: Mutex::new(Vec::new()),
            capacity: AtomicU64::new(capacity),
        }
    }

    /// Put a file straight into the file area
    pub fn insert(&self, collection_id: &str, file_id: &str, content: impl Into<Bytes>) {
        self.files.insert(
            key(collection_id, file_id),
            StoredFile {
                content: content.into(),
                modified: Utc::now(),
            },
        );
    }

    /// Put a file straight into the file area with a given modification time
    pub fn insert_at(
        &self,
        collection_id: &str,
        file_id: &str,
        content: impl Into<Bytes>,
        modified: DateTime<Utc>,
    ) {
        self.files.insert(
            key(collection_id, file_id),
            StoredFile {
                content: content.into(),
                modified,
            },
        );
    }

    pub fn content(&self, collection_id: &str, file_id: &str) -> Option<Bytes> {
        self.files
            .get(&key(collection_id, file_id))
            .map(|f| f.content.clone())
    }

    pub fn set_capacity(&self, capacity: u64) {
        self.capacity.store(capacity, Ordering::SeqCst);
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn retained(&self, collection_id: &str, file_id: &str) -> Vec<Bytes> {
        let wanted = key(collection_id, file_id);
        self.retained
            .lock()
            .iter()
            .filter(|(k, _)| *k == wanted)
            .map(|(_, content)| content.clone())
            .collect()
    }

    fn used(&self) -> u64 {
        self.files
            .iter()
            .map(|f| f.content.len() as u64)
            .sum()
    }

    fn stored(&self, collection_id: &str, file_id: &str) -> Result<StoredFile> {
        self.files
            .get(&key(collection_id, file_id))
            .map(|f| f.clone())
            .ok_or_else(|| PillarError::FileNotFound(file_id.to_string()))
    }

    fn take_staged(&self, collection_id: &str, file_id: &str) -> Result<Bytes> {
        self.staged
            .remove(&key(collection_id, file_id))
            .map(|(_, content)| content)
            .ok_or_else(|| PillarError::Storage(format!("Nothing staged for '{}'", file_id)))
    }
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new(u64::MAX / 2)
    }
}

#[async_trait]
impl FileArchive for MemoryArchive {
    async fn has_file(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        Ok(self.files.contains_key(&key(collection_id, file_id)))
    }

    async fn get_file(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
        let stored = self.stored(collection_id, file_id)?;
        Ok(Box::new(Cursor::new(stored.content)))
    }

    async fn file_size(&self, collection_id: &str, file_id: &str) -> Result<u64> {
        Ok(self.stored(collection_id, file_id)?.content.len() as u64)
    }

    async fn last_modified(&self, collection_id: &str, file_id: &str) -> Result<DateTime<Utc>> {
        Ok(self.stored(collection_id, file_id)?.modified)
    }

    async fn stage(&self, collection_id: &str, file_id: &str, data: Bytes) -> Result<()> {
        debug!("Staging {} bytes for {}/{}", data.len(), collection_id, file_id);
        self.staged.insert(key(collection_id, file_id), data);
        Ok(())
    }

    async fn get_staged(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
        let staged = self
            .staged
            .get(&key(collection_id, file_id))
            .map(|content| content.clone())
            .ok_or_else(|| PillarError::Storage(format!("Nothing staged for '{}'", file_id)))?;
        Ok(Box::new(Cursor::new(staged)))
    }

    async fn commit(&self, collection_id: &str, file_id: &str) -> Result<()> {
        if self.files.contains_key(&key(collection_id, file_id)) {
            return Err(PillarError::FileExists(file_id.to_string()));
        }
        let content = self.take_staged(collection_id, file_id)?;
        self.insert(collection_id, file_id, content);
        Ok(())
    }

    async fn replace(&self, collection_id: &str, file_id: &str) -> Result<()> {
        let old = self.stored(collection_id, file_id)?;
        let content = self.take_staged(collection_id, file_id)?;
        self.retained
            .lock()
            .push((key(collection_id, file_id), old.content));
        self.insert(collection_id, file_id, content);
        Ok(())
    }

    async fn delete(&self, collection_id: &str, file_id: &str) -> Result<()> {
        let (k, old) = self
            .files
            .remove(&key(collection_id, file_id))
            .ok_or_else(|| PillarError::FileNotFound(file_id.to_string()))?;
        self.retained.lock().push((k, old.content));
        Ok(())
    }

    fn discard_staged(&self, collection_id: &str, file_id: &str) {
        self.staged.remove(&key(collection_id, file_id));
    }

    async fn size_left(&self) -> Result<u64> {
        Ok(self
            .capacity
            .load(Ordering::SeqCst)
            .saturating_sub(self.used()))
    }

    async fn list_file_ids(&self, collection_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .files
            .iter()
            .filter(|entry| entry.key().0 == collection_id)
            .map(|entry| entry.key().1.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_accounts_for_stored_files() {
        let archive = MemoryArchive::new(100);
        archive.insert("books", "a", vec![0u8; 40]);
        assert_eq!(archive.size_left().await.unwrap(), 60);

        archive.set_capacity(10);
        assert_eq!(archive.size_left().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let archive = MemoryArchive::default();
        archive.insert("books", "a", "x");
        archive.insert("music", "b", "y");

        assert!(archive.has_file("books", "a").await.unwrap());
        assert!(!archive.has_file("books", "b").await.unwrap());
        assert_eq!(archive.list_file_ids("music").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_replace_and_delete_retain_content() {
        let archive = MemoryArchive::default();
        archive.insert("books", "a", "v1");
        archive.stage("books", "a", Bytes::from_static(b"v2")).await.unwrap();
        archive.replace("books", "a").await.unwrap();
        archive.delete("books", "a").await.unwrap();

        assert!(!archive.has_file("books", "a").await.unwrap());
        assert_eq!(
            archive.retained("books", "a"),
            vec![Bytes::from_static(b"v1"), Bytes::from_static(b"v2")]
        );
        assert_eq!(archive.staged_count(), 0);
    }
}
