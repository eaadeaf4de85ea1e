// Content exchange
//
// Moves file bytes between the pillar and the addresses clients name in their
// requests: downloads for Put and Replace, uploads for GetFile and for
// enumeration results delivered by reference.

use crate::error::{PillarError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Client;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// File transfer collaborator.
///
/// Every failure, including timeouts, is reported as
/// `PillarError::Transfer`, which handlers answer with
/// FILE_TRANSFER_FAILURE.
#[async_trait]
pub trait FileExchange: Send + Sync {
    /// Fetch the content found at `address`.
    async fn download(&self, address: &str) -> Result<Bytes>;

    /// Deliver `data` to `address`.
    async fn upload(&self, data: Bytes, address: &str) -> Result<()>;

    /// Deliver the content of a local file to `address`.
    async fn upload_file(&self, path: &Path, address: &str) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.upload(Bytes::from(data), address).await
    }
}

/// Exchange over HTTP: GET to download, PUT to upload
pub struct HttpFileExchange {
    client: Client,
}

impl HttpFileExchange {
    /// Create an exchange whose transfers give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PillarError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FileExchange for HttpFileExchange {
    async fn download(&self, address: &str) -> Result<Bytes> {
        let url = Url::parse(address)?;
        debug!("Downloading from {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let data = response.bytes().await?;
        info!("Downloaded {} bytes from {}", data.len(), address);
        Ok(data)
    }

    async fn upload(&self, data: Bytes, address: &str) -> Result<()> {
        let url = Url::parse(address)?;
        let size = data.len();
        debug!("Uploading {} bytes to {}", size, url);
        self.client
            .put(url)
            .body(data)
            .send()
            .await?
            .error_for_status()?;
        info!("Uploaded {} bytes to {}", size, address);
        Ok(())
    }
}

/// Exchange backed by a map of address to content
#[derive(Default)]
pub struct MemoryFileExchange {
    content: DashMap<String, Bytes>,
    unreachable: AtomicBool,
}

impl MemoryFileExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make content available for download at `address`
    pub fn insert(&self, address: &str, data: impl Into<Bytes>) {
        self.content.insert(address.to_string(), data.into());
    }

    /// Content uploaded to (or inserted at) `address`
    pub fn get(&self, address: &str) -> Option<Bytes> {
        self.content.get(address).map(|data| data.clone())
    }

    /// Make every transfer fail, as an unreachable server would
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self, address: &str) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PillarError::Transfer(format!(
                "Could not connect to '{}'",
                address
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FileExchange for MemoryFileExchange {
    async fn download(&self, address: &str) -> Result<Bytes> {
        self.check_reachable(address)?;
        self.get(address)
            .ok_or_else(|| PillarError::Transfer(format!("Nothing found at '{}'", address)))
    }

    async fn upload(&self, data: Bytes, address: &str) -> Result<()> {
        self.check_reachable(address)?;
        self.content.insert(address.to_string(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_exchange_round_trip_and_outage() {
        let exchange = MemoryFileExchange::new();
        exchange
            .upload(Bytes::from_static(b"payload"), "mem://a")
            .await
            .unwrap();
        assert_eq!(exchange.download("mem://a").await.unwrap(), "payload");

        exchange.set_unreachable(true);
        let err = exchange.download("mem://a").await.unwrap_err();
        assert!(matches!(err, PillarError::Transfer(_)));
    }

    #[tokio::test]
    async fn test_upload_file_reads_local_content() {
        let exchange = MemoryFileExchange::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from disk").unwrap();

        exchange.upload_file(file.path(), "mem://b").await.unwrap();
        assert_eq!(exchange.get("mem://b").unwrap(), "from disk");
    }

    #[tokio::test]
    async fn test_http_exchange_rejects_bad_address() {
        let exchange = HttpFileExchange::new(Duration::from_secs(1)).unwrap();
        let err = exchange.download("not a url").await.unwrap_err();
        assert!(matches!(err, PillarError::Transfer(_)));
    }
}
