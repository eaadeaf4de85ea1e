//! # Storage Module for the Pillar Node
//!
//! The pillar keeps two kinds of state: the file bytes themselves, held by a
//! [`FileArchive`], and the checksums calculated over them, held by a
//! [`ChecksumStore`]. Request handlers never talk to either directly; they go
//! through the [`StorageModel`](model::StorageModel), which hides whether the
//! pillar is a full pillar (archive + cache) or a checksum pillar (cache
//! only).
//!
//! ## Archive layout
//!
//! Each collection gets its own area with three parts:
//!
//! * a file area holding the committed files
//! * a staging area receiving downloads before they are verified
//! * a retention area receiving files that were deleted or replaced
//!
//! A staged file is either committed or discarded. The [`StagingGuard`]
//! discards it when dropped, so every exit path of a Put or Replace leaves the
//! staging area clean.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pillar_node::storage::{FileArchive, FileSystemArchive};
//! use bytes::Bytes;
//!
//! # async fn example() -> pillar_node::error::Result<()> {
//! let archive = FileSystemArchive::new("data/archive", &["books".to_string()])?;
//! archive.stage("books", "file1", Bytes::from_static(b"content")).await?;
//! archive.commit("books", "file1").await?;
//! assert!(archive.has_file("books", "file1").await?);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::debug;

/// Filesystem archive with per-collection file, staging and retention areas
pub mod file_archive;
/// Per-file locks serializing check-then-act sequences
pub mod locks;
/// In-memory archive
pub mod memory_archive;
/// In-memory checksum cache
pub mod memory_checksum_store;
/// The storage view offered to request handlers
pub mod model;
/// SQLite-based checksum cache
pub mod sql_checksum_store;

pub use file_archive::FileSystemArchive;
pub use locks::{FileLockGuard, FileLocks};
pub use memory_archive::MemoryArchive;
pub use memory_checksum_store::MemoryChecksumStore;
pub use model::StorageModel;
pub use sql_checksum_store::SqliteChecksumStore;

/// Streaming access to the content of one file
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte store for the files of every collection served by this pillar.
///
/// Implementations are shared between concurrent conversations and must be
/// safe to call from several tasks at once. After `commit` or `replace`
/// returns, `has_file` reflects the new state.
#[async_trait]
pub trait FileArchive: Send + Sync {
    /// Check whether a committed file exists.
    async fn has_file(&self, collection_id: &str, file_id: &str) -> Result<bool>;

    /// Open a committed file for reading.
    ///
    /// # Errors
    ///
    /// `PillarError::FileNotFound` when the file does not exist.
    async fn get_file(&self, collection_id: &str, file_id: &str) -> Result<FileReader>;

    /// Size in bytes of a committed file.
    async fn file_size(&self, collection_id: &str, file_id: &str) -> Result<u64>;

    /// When a committed file was last written.
    async fn last_modified(&self, collection_id: &str, file_id: &str) -> Result<DateTime<Utc>>;

    /// Write downloaded content into the staging area, replacing any earlier
    /// staged content for the same file.
    async fn stage(&self, collection_id: &str, file_id: &str, data: Bytes) -> Result<()>;

    /// Open staged content for reading, typically to verify its checksum.
    async fn get_staged(&self, collection_id: &str, file_id: &str) -> Result<FileReader>;

    /// Move staged content into the file area.
    ///
    /// # Errors
    ///
    /// `PillarError::FileExists` when a committed file already has that id.
    async fn commit(&self, collection_id: &str, file_id: &str) -> Result<()>;

    /// Swap staged content in for an existing file. The previous content is
    /// moved to the retention area.
    async fn replace(&self, collection_id: &str, file_id: &str) -> Result<()>;

    /// Remove a committed file, moving it to the retention area.
    ///
    /// # Errors
    ///
    /// `PillarError::FileNotFound` when the file does not exist.
    async fn delete(&self, collection_id: &str, file_id: &str) -> Result<()>;

    /// Drop any staged content for the file. Missing content is not an error.
    ///
    /// Synchronous so that it can run from `Drop`.
    fn discard_staged(&self, collection_id: &str, file_id: &str);

    /// Bytes left for new files.
    async fn size_left(&self) -> Result<u64>;

    /// Ids of all committed files in a collection, sorted.
    async fn list_file_ids(&self, collection_id: &str) -> Result<Vec<String>>;
}

/// Cached checksum of one file, calculated with the pillar's default spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub collection_id: String,
    pub file_id: String,
    /// Lowercase hex digest
    pub checksum: String,
    pub calculation_date: DateTime<Utc>,
}

/// Cache of default-spec checksums, keyed by (collection, file id).
///
/// The cache may be empty at any time; callers compute and store missing
/// entries. On a checksum pillar it is the only record of a file.
#[async_trait]
pub trait ChecksumStore: Send + Sync {
    /// Look up the cached checksum for a file.
    async fn get_entry(&self, collection_id: &str, file_id: &str) -> Result<Option<ChecksumEntry>>;

    /// Insert or overwrite the cached checksum for a file.
    async fn put_entry(&self, entry: ChecksumEntry) -> Result<()>;

    /// Remove the cached checksum for a file. Returns whether it existed.
    async fn delete_entry(&self, collection_id: &str, file_id: &str) -> Result<bool>;

    /// All entries of a collection, ordered by calculation date then file id.
    async fn list_entries(&self, collection_id: &str) -> Result<Vec<ChecksumEntry>>;

    /// Check whether an entry exists.
    async fn has_entry(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        Ok(self.get_entry(collection_id, file_id).await?.is_some())
    }
}

/// Discards staged content when dropped.
///
/// Hold one for the whole staging phase of a Put or Replace. Once the content
/// has been committed, the discard finds nothing and does nothing.
pub struct StagingGuard {
    archive: Arc<dyn FileArchive>,
    collection_id: String,
    file_id: String,
}

impl StagingGuard {
    pub fn new(archive: Arc<dyn FileArchive>, collection_id: &str, file_id: &str) -> Self {
        Self {
            archive,
            collection_id: collection_id.to_string(),
            file_id: file_id.to_string(),
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        debug!(
            "Clearing staging area for {}/{}",
            self.collection_id, self.file_id
        );
        self.archive
            .discard_staged(&self.collection_id, &self.file_id);
    }
}
