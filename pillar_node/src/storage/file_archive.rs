// Filesystem archive
//
// Layout under the base directory:
//
//   <base>/<collection>/files/    committed files
//   <base>/<collection>/staging/  downloads awaiting verification
//   <base>/<collection>/retain/   deleted and replaced files
//
// Moving between the areas is a rename, so a file is never visible in the
// file area half written.

use super::{FileArchive, FileReader};
use crate::error::{PillarError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{debug, info, warn};

const FILE_DIR: &str = "files";
const STAGING_DIR: &str = "staging";
const RETAIN_DIR: &str = "retain";

#[derive(Debug, Clone)]
struct CollectionDirs {
    files: PathBuf,
    staging: PathBuf,
    retain: PathBuf,
}

/// Archive storing each file as a plain file on disk
#[derive(Debug)]
pub struct FileSystemArchive {
    base_dir: PathBuf,
    collections: HashMap<String, CollectionDirs>,
}

impl FileSystemArchive {
    /// Create the archive, making the directories of every collection.
    pub fn new(base_dir: impl AsRef<Path>, collection_ids: &[String]) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let mut collections = HashMap::new();

        for collection_id in collection_ids {
            let root = base_dir.join(collection_id);
            let dirs = CollectionDirs {
                files: root.join(FILE_DIR),
                staging: root.join(STAGING_DIR),
                retain: root.join(RETAIN_DIR),
            };
            for dir in [&dirs.files, &dirs.staging, &dirs.retain] {
                std::fs::create_dir_all(dir)?;
            }
            collections.insert(collection_id.clone(), dirs);
        }

        info!(
            "File archive at {:?} serving {} collection(s)",
            base_dir,
            collections.len()
        );
        Ok(Self {
            base_dir,
            collections,
        })
    }

    fn dirs(&self, collection_id: &str) -> Result<&CollectionDirs> {
        self.collections
            .get(collection_id)
            .ok_or_else(|| PillarError::Storage(format!("Unknown collection '{}'", collection_id)))
    }

    fn checked_name(file_id: &str) -> Result<&str> {
        if file_id.is_empty()
            || file_id.contains('/')
            || file_id.contains('\\')
            || file_id == "."
            || file_id == ".."
        {
            return Err(PillarError::Storage(format!("Illegal file id '{}'", file_id)));
        }
        Ok(file_id)
    }

    fn file_path(&self, collection_id: &str, file_id: &str) -> Result<PathBuf> {
        Ok(self.dirs(collection_id)?.files.join(Self::checked_name(file_id)?))
    }

    fn staged_path(&self, collection_id: &str, file_id: &str) -> Result<PathBuf> {
        Ok(self.dirs(collection_id)?.staging.join(Self::checked_name(file_id)?))
    }

    async fn retain_path(&self, collection_id: &str, file_id: &str) -> Result<PathBuf> {
        let retain = &self.dirs(collection_id)?.retain;
        let name = Self::checked_name(file_id)?;
        let candidate = retain.join(name);
        if tokio::fs::try_exists(&candidate).await? {
            let stamped = format!("{}.{}", name, Utc::now().format("%Y%m%dT%H%M%S%.3f"));
            return Ok(retain.join(stamped));
        }
        Ok(candidate)
    }

    async fn existing_file(&self, collection_id: &str, file_id: &str) -> Result<PathBuf> {
        let path = self.file_path(collection_id, file_id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(PillarError::FileNotFound(file_id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PillarError::FileNotFound(file_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileArchive for FileSystemArchive {
    async fn has_file(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        match self.existing_file(collection_id, file_id).await {
            Ok(_) => Ok(true),
            Err(PillarError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_file(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
        let path = self.existing_file(collection_id, file_id).await?;
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn file_size(&self, collection_id: &str, file_id: &str) -> Result<u64> {
        let path = self.existing_file(collection_id, file_id).await?;
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn last_modified(&self, collection_id: &str, file_id: &str) -> Result<DateTime<Utc>> {
        let path = self.existing_file(collection_id, file_id).await?;
        let modified = tokio::fs::metadata(path).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn stage(&self, collection_id: &str, file_id: &str, data: Bytes) -> Result<()> {
        let path = self.staged_path(collection_id, file_id)?;
        debug!("Staging {} bytes at {:?}", data.len(), path);
        tokio::fs::write(path, &data).await?;
        Ok(())
    }

    async fn get_staged(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
        let path = self.staged_path(collection_id, file_id)?;
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PillarError::Storage(format!(
                "Nothing staged for '{}'",
                file_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, collection_id: &str, file_id: &str) -> Result<()> {
        let target = self.file_path(collection_id, file_id)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(PillarError::FileExists(file_id.to_string()));
        }
        let staged = self.staged_path(collection_id, file_id)?;
        tokio::fs::rename(&staged, &target).await?;
        info!("Committed '{}' to collection '{}'", file_id, collection_id);
        Ok(())
    }

    async fn replace(&self, collection_id: &str, file_id: &str) -> Result<()> {
        let current = self.existing_file(collection_id, file_id).await?;
        let staged = self.staged_path(collection_id, file_id)?;
        if !tokio::fs::try_exists(&staged).await? {
            return Err(PillarError::Storage(format!(
                "Nothing staged for '{}'",
                file_id
            )));
        }
        let retained = self.retain_path(collection_id, file_id).await?;
        tokio::fs::rename(&current, &retained).await?;
        tokio::fs::rename(&staged, &current).await?;
        info!(
            "Replaced '{}' in collection '{}', old content retained at {:?}",
            file_id, collection_id, retained
        );
        Ok(())
    }

    async fn delete(&self, collection_id: &str, file_id: &str) -> Result<()> {
        let current = self.existing_file(collection_id, file_id).await?;
        let retained = self.retain_path(collection_id, file_id).await?;
        tokio::fs::rename(&current, &retained).await?;
        info!(
            "Deleted '{}' from collection '{}', retained at {:?}",
            file_id, collection_id, retained
        );
        Ok(())
    }

    // Must finish before the file lock is released: a removal deferred to
    // another thread could delete the next conversation's staged content.
    // Unlinking does not depend on the file size.
    fn discard_staged(&self, collection_id: &str, file_id: &str) {
        let path = match self.staged_path(collection_id, file_id) {
            Ok(path) => path,
            Err(_) => return,
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Discarded staged content at {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not discard staged content at {:?}: {}", path, e),
        }
    }

    async fn size_left(&self) -> Result<u64> {
        let base = tokio::fs::canonicalize(&self.base_dir).await?;
        let available = tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .filter(|disk| base.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(|disk| disk.available_space())
        })
        .await?;

        available.ok_or_else(|| {
            PillarError::Storage(format!("No disk found for archive at {:?}", self.base_dir))
        })
    }

    async fn list_file_ids(&self, collection_id: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dirs(collection_id)?.files).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
