//! src/services/object_store_client.rs
//!
//! ObjectStoreClient: the only place that talks to the remote blob store.
//! Every backend specific detail (GCS, S3, the in-memory store used for local
//! runs) sits behind four primitives: put, list, signed URL generation and
//! delete. Each backend call runs under a per-call deadline.

use crate::{
    config::{AppConfig, BackendKind},
    models::object::{DownloadedObject, SignedDownload, StoredObject},
    services::local_signer::LocalSigner,
};
use anyhow::Context as _;
use axum::http::Method;
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use futures::TryStreamExt;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectMeta, ObjectStore, PutOptions, PutPayload,
    aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, memory::InMemory, path::Path,
    signer::Signer,
};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    #[error("backend {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("object `{0}` was not visible after upload")]
    WriteNotVisible(String),
    #[error("download link has expired")]
    SignatureExpired,
    #[error("download link signature is invalid")]
    SignatureInvalid,
    #[error("cannot sign download url: {0}")]
    Signing(String),
    #[error(transparent)]
    Backend(#[from] object_store::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Who mints download URLs for the configured store.
#[derive(Clone, Debug)]
enum UrlSigner {
    /// The cloud store signs URLs that point at itself.
    Remote(Arc<dyn Signer>),
    /// Links point back at this service and are checked here.
    Local(Arc<LocalSigner>),
}

impl UrlSigner {
    fn as_signer(&self) -> &dyn Signer {
        match self {
            UrlSigner::Remote(signer) => signer.as_ref(),
            UrlSigner::Local(signer) => signer.as_ref(),
        }
    }
}

/// Process-wide handle to the remote bucket.
///
/// Built once at startup and cloned into every request; clones share the
/// same backend connection pool and credentials.
#[derive(Clone, Debug)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    signer: UrlSigner,
    call_timeout: Duration,
    verify_writes: bool,
}

impl ObjectStoreClient {
    /// Build the client for whichever backend `cfg` selects.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let options = ClientOptions::new().with_timeout(cfg.call_timeout);

        let client = match cfg.backend {
            BackendKind::Gcs => {
                let gcs = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&cfg.bucket)
                    .with_service_account_path(&cfg.credentials_path)
                    .with_client_options(options)
                    .build()
                    .with_context(|| format!("configuring GCS bucket `{}`", cfg.bucket))?;
                let gcs = Arc::new(gcs);
                Self::new(gcs.clone(), UrlSigner::Remote(gcs), cfg.call_timeout)
            }
            BackendKind::S3 => {
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(&cfg.bucket)
                    .with_client_options(options)
                    .build()
                    .with_context(|| format!("configuring S3 bucket `{}`", cfg.bucket))?;
                let s3 = Arc::new(s3);
                Self::new(s3.clone(), UrlSigner::Remote(s3), cfg.call_timeout)
            }
            BackendKind::Memory => Self::in_memory(
                LocalSigner::new(cfg.public_url.clone(), &cfg.signing_secret.0)
                    .map_err(|err| anyhow::anyhow!("building local url signer: {}", err))?,
                cfg.call_timeout,
            ),
        };

        info!(backend = ?cfg.backend, bucket = %cfg.bucket, "object store client ready");
        Ok(client.with_write_verification(cfg.verify_writes))
    }

    /// A fresh, empty process-local store whose links are signed by `signer`.
    pub fn in_memory(signer: LocalSigner, call_timeout: Duration) -> Self {
        Self::new(
            Arc::new(InMemory::new()),
            UrlSigner::Local(Arc::new(signer)),
            call_timeout,
        )
    }

    fn new(store: Arc<dyn ObjectStore>, signer: UrlSigner, call_timeout: Duration) -> Self {
        Self {
            store,
            signer,
            call_timeout,
            verify_writes: false,
        }
    }

    /// Re-read metadata after each put, for stores without read-after-write.
    pub fn with_write_verification(mut self, enabled: bool) -> Self {
        self.verify_writes = enabled;
        self
    }

    /// Upload `content` under `name`, replacing whatever was stored there.
    pub async fn put(
        &self,
        name: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<StoredObject> {
        let path = object_path(name)?;
        let size_bytes = content.len() as u64;

        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        debug!(%path, size_bytes, "put object");
        let result = self
            .bounded(
                "put",
                name,
                self.store.put_opts(&path, PutPayload::from(content), opts),
            )
            .await?;

        if self.verify_writes {
            let meta = self
                .bounded("head", name, self.store.head(&path))
                .await
                .map_err(|err| match err {
                    StorageError::NotFound(name) => StorageError::WriteNotVisible(name),
                    other => other,
                })?;
            if !write_is_visible(size_bytes, result.e_tag.as_deref(), &meta) {
                warn!(%path, expected = size_bytes, found = meta.size, "stale read after put");
                return Err(StorageError::WriteNotVisible(name.to_string()));
            }
            return Ok(meta.into());
        }

        Ok(StoredObject {
            name: path.to_string(),
            size_bytes,
            last_modified: Utc::now(),
            e_tag: result.e_tag,
        })
    }

    /// Every object name in the bucket, sorted.
    ///
    /// The backend stream follows continuation tokens on its own; it is
    /// drained completely before returning.
    pub async fn list(&self) -> StorageResult<Vec<String>> {
        let metas: Vec<ObjectMeta> = self
            .bounded("list", "", self.store.list(None).try_collect())
            .await?;

        let mut names: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        names.sort();
        debug!(count = names.len(), "listed objects");
        Ok(names)
    }

    /// Metadata for one object.
    pub async fn head(&self, name: &str) -> StorageResult<StoredObject> {
        let path = object_path(name)?;
        let meta = self.bounded("head", name, self.store.head(&path)).await?;
        Ok(meta.into())
    }

    /// Mint a read-only URL for `name` that stays valid for `ttl`.
    ///
    /// Existence is checked first so absent objects surface as NotFound
    /// rather than as a URL that fails later in the browser.
    pub async fn generate_signed_url(
        &self,
        name: &str,
        ttl: Duration,
    ) -> StorageResult<SignedDownload> {
        let path = object_path(name)?;
        self.bounded("head", name, self.store.head(&path)).await?;

        let lifetime =
            TimeDelta::from_std(ttl).map_err(|err| StorageError::Signing(err.to_string()))?;
        let expires_at = Utc::now() + lifetime;
        let url = self
            .bounded(
                "sign",
                name,
                self.signer.as_signer().signed_url(Method::GET, &path, ttl),
            )
            .await?;

        debug!(%path, %expires_at, "signed download url");
        Ok(SignedDownload {
            url: url.to_string(),
            expires_at,
        })
    }

    /// Remove `name`. Absent objects are NotFound; stores such as S3 would
    /// otherwise report success for them.
    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = object_path(name)?;
        self.bounded("head", name, self.store.head(&path)).await?;
        self.bounded("delete", name, self.store.delete(&path)).await?;
        debug!(%path, "deleted object");
        Ok(())
    }

    /// Fetch bytes for a link minted by the local signer.
    ///
    /// Remote backends never mint such links, so every request is NotFound.
    pub async fn open_signed(
        &self,
        name: &str,
        expires: i64,
        signature: &str,
    ) -> StorageResult<DownloadedObject> {
        let path = object_path(name)?;
        match &self.signer {
            UrlSigner::Local(local) => local.verify(&path, expires, signature)?,
            UrlSigner::Remote(_) => return Err(StorageError::NotFound(name.to_string())),
        }

        let result = self.bounded("get", name, self.store.get(&path)).await?;
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        let object = StoredObject::from(result.meta.clone());
        let content = self.bounded("get", name, result.bytes()).await?;

        Ok(DownloadedObject {
            object,
            content_type,
            content,
        })
    }

    /// Cheap reachability check: look up a key that should not exist.
    pub async fn probe(&self) -> StorageResult<()> {
        let probe = format!(".readyz-{}", Uuid::new_v4());
        match self.head(&probe).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Run one backend call under the configured deadline and classify its
    /// failure.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        name: &str,
        call: impl Future<Output = object_store::Result<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(object_store::Error::NotFound { .. })) => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Ok(Err(err)) => {
                warn!(operation, object = name, error = %err, "backend call failed");
                Err(StorageError::Backend(err))
            }
            Err(_) => {
                warn!(operation, object = name, after = ?self.call_timeout, "backend call timed out");
                Err(StorageError::Timeout {
                    operation,
                    after: self.call_timeout,
                })
            }
        }
    }
}

/// Map a client-supplied name onto a store key.
///
/// Names are stored verbatim, without percent-encoding. Names the store
/// cannot hold as a key (empty, `.`/`..` or empty segments, control
/// characters) are refused.
fn object_path(name: &str) -> StorageResult<Path> {
    match Path::parse(name) {
        Ok(path) if !path.as_ref().is_empty() => Ok(path),
        _ => Err(StorageError::InvalidName(name.to_string())),
    }
}

/// Whether a post-put metadata read reflects the write just made.
fn write_is_visible(size_bytes: u64, e_tag: Option<&str>, meta: &ObjectMeta) -> bool {
    if meta.size as u64 != size_bytes {
        return false;
    }
    match (e_tag, meta.e_tag.as_deref()) {
        (Some(written), Some(read)) => written == read,
        _ => true,
    }
}
