use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (String, String);

/// One async mutex per (collection, file id).
///
/// Held by PutFile, DeleteFile and ReplaceFile from validation until the
/// archive mutation finished, so the existence check and the mutation of one
/// file cannot interleave with another conversation on the same file.
#[derive(Default)]
pub struct FileLocks {
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, collection_id: &str, file_id: &str) -> FileLockGuard {
        let key = (collection_id.to_string(), file_id.to_string());
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        FileLockGuard {
            guard: Some(guard),
            key,
            locks: self.locks.clone(),
        }
    }

    /// Number of files with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Releases the file lock on drop and forgets the entry once unused
pub struct FileLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: LockKey,
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map still refers to the mutex when nobody else waits on it.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_file_is_serialized() {
        let locks = Arc::new(FileLocks::new());
        let first = locks.lock("books", "file1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("books", "file1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_files_do_not_block() {
        let locks = FileLocks::new();
        let _a = locks.lock("books", "file1").await;
        let _b = locks.lock("books", "file2").await;
        assert_eq!(locks.len(), 2);
    }
}
