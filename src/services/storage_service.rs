//! src/services/storage_service.rs
//!
//! StorageService: the four gallery operations (upload, list, download-url,
//! delete) on top of `ObjectStoreClient`. It holds no per-request state, so
//! any replica can answer any request; the remote bucket is the only source
//! of truth.

use crate::{
    models::object::{DownloadedObject, SignedDownload, StoredObject},
    services::object_store_client::{ObjectStoreClient, StorageError, StorageResult},
};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

/// StorageService validates names and forwards each call to the store:
/// - Upload stores the whole payload under the client's filename
///   (last write wins, no deduplication)
/// - List returns a snapshot of every key
/// - Download mints a fresh signed URL per call; object bytes never pass
///   through here
/// - Delete removes the object, NotFound when it is already gone
#[derive(Clone)]
pub struct StorageService {
    /// Shared handle to the remote store, built once at startup.
    pub client: ObjectStoreClient,

    /// Lifetime of every generated download URL.
    pub url_ttl: Duration,
}

impl StorageService {
    pub fn new(client: ObjectStoreClient, url_ttl: Duration) -> Self {
        Self { client, url_ttl }
    }

    fn ensure_name_present(name: &str) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub async fn upload(
        &self,
        name: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<StoredObject> {
        Self::ensure_name_present(name)?;
        let object = self.client.put(name, content, content_type).await?;
        info!(object = %object.name, size = object.size_bytes, "uploaded object");
        Ok(object)
    }

    pub async fn list(&self) -> StorageResult<Vec<String>> {
        self.client.list().await
    }

    pub async fn download_url(&self, name: &str) -> StorageResult<SignedDownload> {
        Self::ensure_name_present(name)?;
        self.client.generate_signed_url(name, self.url_ttl).await
    }

    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        Self::ensure_name_present(name)?;
        self.client.delete(name).await?;
        info!(object = name, "deleted object");
        Ok(())
    }

    /// Serve a link minted by the in-memory backend's signer.
    pub async fn open_signed(
        &self,
        name: &str,
        expires: i64,
        signature: &str,
    ) -> StorageResult<DownloadedObject> {
        Self::ensure_name_present(name)?;
        self.client.open_signed(name, expires, signature).await
    }

    /// Whether the backend currently answers metadata lookups.
    pub async fn ready(&self) -> StorageResult<()> {
        self.client.probe().await
    }
}
