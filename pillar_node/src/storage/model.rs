// Storage model
//
// The one storage view request handlers see. A full pillar keeps file bytes
// in an archive and default-spec checksums in the cache. A checksum pillar
// has no archive: the cache is its whole state, and it can only answer for
// its own checksum spec.

use super::{ChecksumEntry, ChecksumStore, FileArchive, FileReader, StagingGuard};
use crate::checksum::ChecksumValidator;
use crate::error::{HandlerResult, PillarError, RequestHandlerError, Result};
use crate::types::{
    ChecksumData, ChecksumDataItem, ChecksumSpec, FileIds, FileIdsDataItem, FileInfosDataItem,
    FilePart, ResponseCode, ResultSet,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Timestamp window and page size of an enumeration request
#[derive(Debug, Clone, Default)]
pub struct ResultWindow {
    pub min_timestamp: Option<DateTime<Utc>>,
    pub max_timestamp: Option<DateTime<Utc>>,
    pub max_results: Option<u64>,
}

impl ResultWindow {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.min_timestamp.map_or(true, |min| timestamp >= min)
            && self.max_timestamp.map_or(true, |max| timestamp <= max)
    }
}

pub struct StorageModel {
    archive: Option<Arc<dyn FileArchive>>,
    cache: Arc<dyn ChecksumStore>,
    validator: ChecksumValidator,
    default_spec: ChecksumSpec,
    min_size_left: u64,
}

impl StorageModel {
    /// A pillar holding file bytes. `min_size_left` bytes of the archive are
    /// kept in reserve and never offered to new files.
    pub fn full(
        archive: Arc<dyn FileArchive>,
        cache: Arc<dyn ChecksumStore>,
        default_spec: ChecksumSpec,
        min_size_left: u64,
    ) -> Self {
        Self {
            archive: Some(archive),
            cache,
            validator: ChecksumValidator::new(),
            default_spec,
            min_size_left,
        }
    }

    /// A pillar holding only checksums calculated with `spec`
    pub fn checksum_only(cache: Arc<dyn ChecksumStore>, spec: ChecksumSpec) -> Self {
        Self {
            archive: None,
            cache,
            validator: ChecksumValidator::new(),
            default_spec: spec,
            min_size_left: 0,
        }
    }

    pub fn is_checksum_pillar(&self) -> bool {
        self.archive.is_none()
    }

    pub fn default_spec(&self) -> &ChecksumSpec {
        &self.default_spec
    }

    pub fn validator(&self) -> &ChecksumValidator {
        &self.validator
    }

    fn archive(&self) -> Result<&Arc<dyn FileArchive>> {
        self.archive
            .as_ref()
            .ok_or_else(|| PillarError::Storage("This pillar holds no file content".to_string()))
    }

    pub async fn has_file(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        match &self.archive {
            Some(archive) => archive.has_file(collection_id, file_id).await,
            None => self.cache.has_entry(collection_id, file_id).await,
        }
    }

    /// Fails with FILE_NOT_FOUND_FAILURE when the file is missing.
    pub async fn verify_file_exists(&self, collection_id: &str, file_id: &str) -> HandlerResult<()> {
        if !self.has_file(collection_id, file_id).await? {
            return Err(RequestHandlerError::invalid_message(
                ResponseCode::FileNotFoundFailure,
                format!("The file '{}' has not been found", file_id),
            ));
        }
        Ok(())
    }

    /// Fails with DUPLICATE_FILE_FAILURE when the file is already present.
    pub async fn verify_file_absent(&self, collection_id: &str, file_id: &str) -> HandlerResult<()> {
        if self.has_file(collection_id, file_id).await? {
            return Err(RequestHandlerError::invalid_message(
                ResponseCode::DuplicateFileFailure,
                format!("The file '{}' already exists", file_id),
            ));
        }
        Ok(())
    }

    /// Fails with FAILURE when a file of `size` bytes does not fit into the
    /// usable space, which is the archive's free space minus the reserve.
    /// A checksum pillar stores no bytes and always has room.
    pub async fn verify_enough_space_left(&self, size: Option<u64>) -> HandlerResult<()> {
        let (Some(size), Some(archive)) = (size, &self.archive) else {
            return Ok(());
        };
        let usable = archive.size_left().await?.saturating_sub(self.min_size_left);
        if usable < size {
            return Err(RequestHandlerError::invalid_message(
                ResponseCode::Failure,
                format!(
                    "Not enough space left in this pillar. Requires '{}' but has only '{}'",
                    size, usable
                ),
            ));
        }
        Ok(())
    }

    /// Checks that a requested checksum spec can be delivered.
    ///
    /// A checksum pillar can only deliver its own spec; anything else is
    /// REQUEST_NOT_SUPPORTED.
    pub fn verify_checksum_spec(&self, spec: Option<&ChecksumSpec>) -> HandlerResult<()> {
        self.validator.verify_algorithm_supported(spec, false)?;
        match spec {
            Some(spec) if self.is_checksum_pillar() && *spec != self.default_spec => {
                Err(RequestHandlerError::invalid_message(
                    ResponseCode::RequestNotSupported,
                    format!(
                        "Cannot deliver checksum {}, only {} is held by this pillar",
                        spec, self.default_spec
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    pub async fn open_file(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
        self.archive()?.get_file(collection_id, file_id).await
    }

    /// Read a whole file, or the requested part of it.
    pub async fn read_file(
        &self,
        collection_id: &str,
        file_id: &str,
        part: Option<FilePart>,
    ) -> Result<Bytes> {
        let mut reader = self.open_file(collection_id, file_id).await?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;
        let content = Bytes::from(content);

        Ok(match part {
            None => content,
            Some(part) => {
                let len = content.len() as u64;
                let start = part.part_offset.min(len);
                let end = part.part_offset.saturating_add(part.part_length).min(len);
                content.slice(start as usize..end as usize)
            }
        })
    }

    /// Calculates a checksum from the file content.
    ///
    /// On a checksum pillar there is no content, so the cached value is
    /// returned instead.
    pub async fn compute_checksum(
        &self,
        collection_id: &str,
        file_id: &str,
        spec: &ChecksumSpec,
    ) -> Result<ChecksumData> {
        match &self.archive {
            Some(archive) => {
                let reader = archive.get_file(collection_id, file_id).await?;
                self.validator.compute(reader, spec).await
            }
            None => self.cached_checksum(collection_id, file_id, spec).await,
        }
    }

    /// Returns a checksum, from the cache for the default spec and freshly
    /// computed for any other spec. Missing cache entries are computed and
    /// stored.
    pub async fn checksum_of(
        &self,
        collection_id: &str,
        file_id: &str,
        spec: &ChecksumSpec,
    ) -> Result<ChecksumData> {
        if *spec != self.default_spec {
            return self.compute_checksum(collection_id, file_id, spec).await;
        }
        if let Some(entry) = self.cache.get_entry(collection_id, file_id).await? {
            return Ok(self.entry_to_data(entry));
        }
        self.refresh_cached_checksum(collection_id, file_id).await
    }

    async fn cached_checksum(
        &self,
        collection_id: &str,
        file_id: &str,
        spec: &ChecksumSpec,
    ) -> Result<ChecksumData> {
        if *spec != self.default_spec {
            return Err(PillarError::Checksum(format!(
                "Only {} checksums are held by this pillar",
                self.default_spec
            )));
        }
        self.cache
            .get_entry(collection_id, file_id)
            .await?
            .map(|entry| self.entry_to_data(entry))
            .ok_or_else(|| PillarError::FileNotFound(file_id.to_string()))
    }

    fn entry_to_data(&self, entry: ChecksumEntry) -> ChecksumData {
        ChecksumData {
            checksum_spec: self.default_spec.clone(),
            checksum_value: entry.checksum,
            calculation_timestamp: entry.calculation_date,
        }
    }

    async fn refresh_cached_checksum(&self, collection_id: &str, file_id: &str) -> Result<ChecksumData> {
        let reader = self.archive()?.get_file(collection_id, file_id).await?;
        let data = self.validator.compute(reader, &self.default_spec).await?;
        self.store_in_cache(collection_id, file_id, &data).await?;
        Ok(data)
    }

    async fn store_in_cache(&self, collection_id: &str, file_id: &str, data: &ChecksumData) -> Result<()> {
        self.cache
            .put_entry(ChecksumEntry {
                collection_id: collection_id.to_string(),
                file_id: file_id.to_string(),
                checksum: data.checksum_value.clone(),
                calculation_date: data.calculation_timestamp,
            })
            .await
    }

    /// Compares a claimed checksum with the stored file.
    ///
    /// A full pillar always recomputes from the bytes. A checksum pillar
    /// compares with its cached value.
    pub async fn verify_existing_checksum(
        &self,
        collection_id: &str,
        file_id: &str,
        claimed: &ChecksumData,
    ) -> Result<bool> {
        match &self.archive {
            Some(archive) => {
                let reader = archive.get_file(collection_id, file_id).await?;
                self.validator.verify_matches(claimed, reader, file_id).await
            }
            None => {
                let cached = self
                    .cached_checksum(collection_id, file_id, &claimed.checksum_spec)
                    .await?;
                let matches = cached
                    .checksum_value
                    .eq_ignore_ascii_case(claimed.checksum_value.trim());
                if !matches {
                    warn!(
                        "Checksum mismatch for '{}': expected '{}', cached '{}'",
                        file_id, claimed.checksum_value, cached.checksum_value
                    );
                }
                Ok(matches)
            }
        }
    }

    /// Checks downloaded content against the checksum the client claimed for
    /// it. Mismatches are NEW_FILE_CHECKSUM_FAILURE.
    async fn verify_new_content<R>(&self, claimed: Option<&ChecksumData>, reader: R, file_id: &str) -> HandlerResult<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let Some(claimed) = claimed else {
            return Ok(());
        };
        if !self.validator.verify_matches(claimed, reader, file_id).await? {
            return Err(RequestHandlerError::illegal_operation(
                ResponseCode::NewFileChecksumFailure,
                format!(
                    "The checksum of the delivered file '{}' does not match the expected checksum",
                    file_id
                ),
                file_id,
            ));
        }
        Ok(())
    }

    /// Stores a new file: stage, verify, commit, then refresh the cache.
    ///
    /// The staging area is cleared on every exit path.
    pub async fn store_new_file(
        &self,
        collection_id: &str,
        file_id: &str,
        content: Bytes,
        claimed: Option<&ChecksumData>,
    ) -> HandlerResult<()> {
        let Some(archive) = &self.archive else {
            self.verify_new_content(claimed, &content[..], file_id).await?;
            if self.cache.has_entry(collection_id, file_id).await? {
                return Err(duplicate(file_id));
            }
            let data = self.validator.compute_bytes(&content, &self.default_spec).await?;
            self.store_in_cache(collection_id, file_id, &data).await?;
            info!("Stored checksum of '{}' in collection '{}'", file_id, collection_id);
            return Ok(());
        };

        let _staging = StagingGuard::new(archive.clone(), collection_id, file_id);
        archive.stage(collection_id, file_id, content).await?;

        let staged = archive.get_staged(collection_id, file_id).await?;
        self.verify_new_content(claimed, staged, file_id).await?;

        archive
            .commit(collection_id, file_id)
            .await
            .map_err(|e| match e {
                PillarError::FileExists(_) => duplicate(file_id),
                other => RequestHandlerError::Internal(other),
            })?;
        self.refresh_cached_checksum(collection_id, file_id).await?;
        Ok(())
    }

    /// Replaces an existing file: stage, verify, swap, then refresh the cache.
    ///
    /// The old content ends up in the retention area; the staging area is
    /// cleared on every exit path.
    pub async fn replace_file(
        &self,
        collection_id: &str,
        file_id: &str,
        content: Bytes,
        claimed: Option<&ChecksumData>,
    ) -> HandlerResult<()> {
        let Some(archive) = &self.archive else {
            self.verify_new_content(claimed, &content[..], file_id).await?;
            let data = self.validator.compute_bytes(&content, &self.default_spec).await?;
            self.store_in_cache(collection_id, file_id, &data).await?;
            info!("Replaced checksum of '{}' in collection '{}'", file_id, collection_id);
            return Ok(());
        };

        let _staging = StagingGuard::new(archive.clone(), collection_id, file_id);
        archive.stage(collection_id, file_id, content).await?;

        let staged = archive.get_staged(collection_id, file_id).await?;
        self.verify_new_content(claimed, staged, file_id).await?;

        archive.replace(collection_id, file_id).await?;
        self.refresh_cached_checksum(collection_id, file_id).await?;
        Ok(())
    }

    /// Removes a file and its cached checksum.
    pub async fn delete_file(&self, collection_id: &str, file_id: &str) -> Result<()> {
        if let Some(archive) = &self.archive {
            archive.delete(collection_id, file_id).await?;
        } else if !self.cache.has_entry(collection_id, file_id).await? {
            return Err(PillarError::FileNotFound(file_id.to_string()));
        }
        let removed = self.cache.delete_entry(collection_id, file_id).await?;
        debug!(
            "Deleted '{}' from collection '{}' (cache entry removed: {})",
            file_id, collection_id, removed
        );
        Ok(())
    }

    async fn selected_ids(&self, collection_id: &str, file_ids: &FileIds) -> Result<Vec<String>> {
        match file_ids {
            FileIds::FileId(id) => Ok(vec![id.clone()]),
            FileIds::AllFileIds => match &self.archive {
                Some(archive) => archive.list_file_ids(collection_id).await,
                None => Ok(self
                    .cache
                    .list_entries(collection_id)
                    .await?
                    .into_iter()
                    .map(|entry| entry.file_id)
                    .collect()),
            },
        }
    }

    async fn last_modified(&self, collection_id: &str, file_id: &str) -> Result<(DateTime<Utc>, Option<u64>)> {
        match &self.archive {
            Some(archive) => Ok((
                archive.last_modified(collection_id, file_id).await?,
                Some(archive.file_size(collection_id, file_id).await?),
            )),
            None => {
                let entry = self
                    .cache
                    .get_entry(collection_id, file_id)
                    .await?
                    .ok_or_else(|| PillarError::FileNotFound(file_id.to_string()))?;
                Ok((entry.calculation_date, None))
            }
        }
    }

    /// Checksums of the selected files.
    ///
    /// Default-spec checksums come from the cache and are filtered by their
    /// calculation date. Other specs are computed on the spot, which makes
    /// their timestamps meaningless as a filter, so the window only bounds
    /// the count.
    pub async fn checksum_results(
        &self,
        collection_id: &str,
        file_ids: &FileIds,
        spec: &ChecksumSpec,
        window: &ResultWindow,
    ) -> Result<ResultSet<ChecksumDataItem>> {
        let uses_cache = *spec == self.default_spec;
        let mut items = Vec::new();
        for file_id in self.selected_ids(collection_id, file_ids).await? {
            let data = self.checksum_of(collection_id, &file_id, spec).await?;
            if uses_cache && !window.contains(data.calculation_timestamp) {
                continue;
            }
            items.push(ChecksumDataItem {
                file_id,
                checksum_value: data.checksum_value,
                calculation_timestamp: data.calculation_timestamp,
            });
        }
        if uses_cache {
            items.sort_by(|a, b| {
                a.calculation_timestamp
                    .cmp(&b.calculation_timestamp)
                    .then_with(|| a.file_id.cmp(&b.file_id))
            });
        }
        Ok(ResultSet::bounded(items, window.max_results))
    }

    /// Ids of the selected files, filtered by last modification.
    pub async fn file_id_results(
        &self,
        collection_id: &str,
        file_ids: &FileIds,
        window: &ResultWindow,
    ) -> Result<ResultSet<FileIdsDataItem>> {
        let mut items = Vec::new();
        for file_id in self.selected_ids(collection_id, file_ids).await? {
            let (modified, size) = self.last_modified(collection_id, &file_id).await?;
            if !window.contains(modified) {
                continue;
            }
            items.push(FileIdsDataItem {
                file_id,
                file_size: size,
                last_modification_time: modified,
            });
        }
        items.sort_by(|a, b| {
            a.last_modification_time
                .cmp(&b.last_modification_time)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(ResultSet::bounded(items, window.max_results))
    }

    /// Checksum, size and modification time of the selected files, filtered
    /// like [`checksum_results`](Self::checksum_results).
    pub async fn file_info_results(
        &self,
        collection_id: &str,
        file_ids: &FileIds,
        spec: &ChecksumSpec,
        window: &ResultWindow,
    ) -> Result<ResultSet<FileInfosDataItem>> {
        let uses_cache = *spec == self.default_spec;
        let mut items = Vec::new();
        for file_id in self.selected_ids(collection_id, file_ids).await? {
            let data = self.checksum_of(collection_id, &file_id, spec).await?;
            if uses_cache && !window.contains(data.calculation_timestamp) {
                continue;
            }
            let (modified, size) = self.last_modified(collection_id, &file_id).await?;
            items.push(FileInfosDataItem {
                file_id,
                checksum_value: data.checksum_value,
                calculation_timestamp: data.calculation_timestamp,
                file_size: size,
                last_modification_time: Some(modified),
            });
        }
        if uses_cache {
            items.sort_by(|a, b| {
                a.calculation_timestamp
                    .cmp(&b.calculation_timestamp)
                    .then_with(|| a.file_id.cmp(&b.file_id))
            });
        }
        Ok(ResultSet::bounded(items, window.max_results))
    }
}

fn duplicate(file_id: &str) -> RequestHandlerError {
    RequestHandlerError::invalid_message(
        ResponseCode::DuplicateFileFailure,
        format!("The file '{}' already exists", file_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryArchive, MemoryChecksumStore};
    use crate::types::ChecksumType;
    use chrono::Duration;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn full_model() -> (Arc<MemoryArchive>, Arc<MemoryChecksumStore>, StorageModel) {
        let archive = Arc::new(MemoryArchive::new(1_000));
        let cache = Arc::new(MemoryChecksumStore::new());
        let model = StorageModel::full(
            archive.clone(),
            cache.clone(),
            ChecksumSpec::new(ChecksumType::Md5),
            100,
        );
        (archive, cache, model)
    }

    fn md5(value: &str) -> ChecksumData {
        ChecksumData {
            checksum_spec: ChecksumSpec::new(ChecksumType::Md5),
            checksum_value: value.to_string(),
            calculation_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_space_check_honours_reserve() {
        let (_archive, _cache, model) = full_model();
        assert!(model.verify_enough_space_left(Some(900)).await.is_ok());
        assert!(model.verify_enough_space_left(None).await.is_ok());
        match model.verify_enough_space_left(Some(901)).await {
            Err(RequestHandlerError::InvalidMessage { info }) => {
                assert_eq!(info.response_code, ResponseCode::Failure)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_new_file_fills_cache() {
        let (archive, cache, model) = full_model();
        model
            .store_new_file("books", "file1", Bytes::new(), Some(&md5(EMPTY_MD5)))
            .await
            .unwrap();

        assert!(archive.has_file("books", "file1").await.unwrap());
        let entry = cache.get_entry("books", "file1").await.unwrap().unwrap();
        assert_eq!(entry.checksum, EMPTY_MD5);
        assert_eq!(archive.staged_count(), 0);
    }

    #[tokio::test]
    async fn test_store_new_file_with_bad_checksum_clears_staging() {
        let (archive, cache, model) = full_model();
        let err = model
            .store_new_file("books", "file1", Bytes::from_static(b"data"), Some(&md5(EMPTY_MD5)))
            .await
            .unwrap_err();

        match err {
            RequestHandlerError::IllegalOperation { info, .. } => {
                assert_eq!(info.response_code, ResponseCode::NewFileChecksumFailure);
                assert!(!info.response_text.contains("8d777f385d3dfec8815d20f7496026dc"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!archive.has_file("books", "file1").await.unwrap());
        assert_eq!(archive.staged_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_checksum_pillar_rejects_foreign_spec() {
        let model = StorageModel::checksum_only(
            Arc::new(MemoryChecksumStore::new()),
            ChecksumSpec::new(ChecksumType::Md5),
        );
        assert!(model
            .verify_checksum_spec(Some(&ChecksumSpec::new(ChecksumType::Md5)))
            .is_ok());
        match model.verify_checksum_spec(Some(&ChecksumSpec::new(ChecksumType::Sha256))) {
            Err(RequestHandlerError::InvalidMessage { info }) => {
                assert_eq!(info.response_code, ResponseCode::RequestNotSupported)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checksum_pillar_keeps_only_checksums() {
        let cache = Arc::new(MemoryChecksumStore::new());
        let model = StorageModel::checksum_only(cache.clone(), ChecksumSpec::new(ChecksumType::Md5));

        model
            .store_new_file("books", "file1", Bytes::new(), None)
            .await
            .unwrap();
        assert!(model.has_file("books", "file1").await.unwrap());
        assert!(model
            .verify_existing_checksum("books", "file1", &md5(EMPTY_MD5))
            .await
            .unwrap());

        let err = model
            .store_new_file("books", "file1", Bytes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestHandlerError::InvalidMessage { .. }));

        model.delete_file("books", "file1").await.unwrap();
        assert!(cache.is_empty());
        assert!(model.read_file("books", "file1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_file_ids_window_and_order() {
        let (archive, _cache, model) = full_model();
        let start = Utc::now() - Duration::hours(1);
        for i in 0..6 {
            archive.insert_at("books", &format!("f{}", 5 - i), "x", start + Duration::minutes(i));
        }

        let window = ResultWindow {
            min_timestamp: Some(start + Duration::minutes(2)),
            max_timestamp: None,
            max_results: Some(2),
        };
        let result = model
            .file_id_results("books", &FileIds::AllFileIds, &window)
            .await
            .unwrap();
        let ids: Vec<&str> = result.entries.iter().map(|e| e.file_id.as_str()).collect();
        assert_eq!(ids, vec!["f3", "f2"]);
        assert!(result.partial_result);
    }

    #[tokio::test]
    async fn test_read_file_part() {
        let (archive, _cache, model) = full_model();
        archive.insert("books", "file1", "0123456789");

        let part = FilePart {
            part_offset: 2,
            part_length: 3,
        };
        let content = model.read_file("books", "file1", Some(part)).await.unwrap();
        assert_eq!(&content[..], b"234");

        let tail = FilePart {
            part_offset: 8,
            part_length: 100,
        };
        let content = model.read_file("books", "file1", Some(tail)).await.unwrap();
        assert_eq!(&content[..], b"89");
    }

    /// Archive whose disk fills up partway through staging
    struct FullDisk {
        inner: Arc<MemoryArchive>,
    }

    #[async_trait::async_trait]
    impl FileArchive for FullDisk {
        async fn has_file(&self, collection_id: &str, file_id: &str) -> Result<bool> {
            self.inner.has_file(collection_id, file_id).await
        }

        async fn get_file(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
            self.inner.get_file(collection_id, file_id).await
        }

        async fn file_size(&self, collection_id: &str, file_id: &str) -> Result<u64> {
            self.inner.file_size(collection_id, file_id).await
        }

        async fn last_modified(&self, collection_id: &str, file_id: &str) -> Result<DateTime<Utc>> {
            self.inner.last_modified(collection_id, file_id).await
        }

        async fn stage(&self, collection_id: &str, file_id: &str, data: Bytes) -> Result<()> {
            self.inner
                .stage(collection_id, file_id, data.slice(..1.min(data.len())))
                .await?;
            Err(PillarError::Storage("No space left on device".to_string()))
        }

        async fn get_staged(&self, collection_id: &str, file_id: &str) -> Result<FileReader> {
            self.inner.get_staged(collection_id, file_id).await
        }

        async fn commit(&self, collection_id: &str, file_id: &str) -> Result<()> {
            self.inner.commit(collection_id, file_id).await
        }

        async fn replace(&self, collection_id: &str, file_id: &str) -> Result<()> {
            self.inner.replace(collection_id, file_id).await
        }

        async fn delete(&self, collection_id: &str, file_id: &str) -> Result<()> {
            self.inner.delete(collection_id, file_id).await
        }

        fn discard_staged(&self, collection_id: &str, file_id: &str) {
            self.inner.discard_staged(collection_id, file_id)
        }

        async fn size_left(&self) -> Result<u64> {
            self.inner.size_left().await
        }

        async fn list_file_ids(&self, collection_id: &str) -> Result<Vec<String>> {
            self.inner.list_file_ids(collection_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_staging_leaves_nothing_behind() {
        let inner = Arc::new(MemoryArchive::new(1_000));
        inner.insert("books", "file2", Bytes::from_static(b"old"));
        let model = StorageModel::full(
            Arc::new(FullDisk {
                inner: inner.clone(),
            }),
            Arc::new(MemoryChecksumStore::new()),
            ChecksumSpec::new(ChecksumType::Md5),
            0,
        );

        let stored = model
            .store_new_file("books", "file1", Bytes::from_static(b"data"), None)
            .await;
        assert!(matches!(stored, Err(RequestHandlerError::Internal(_))));
        assert_eq!(inner.staged_count(), 0);
        assert!(!inner.has_file("books", "file1").await.unwrap());

        let replaced = model
            .replace_file("books", "file2", Bytes::from_static(b"new"), None)
            .await;
        assert!(replaced.is_err());
        assert_eq!(inner.staged_count(), 0);
        assert!(inner.retained("books", "file2").is_empty());
    }
}
