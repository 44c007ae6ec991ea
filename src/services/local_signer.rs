//! HMAC-signed download links for the in-memory backend.
//!
//! Remote backends hand out URLs that point straight at the cloud store. The
//! in-memory store has no such endpoint, so its links point back at this
//! service's `GET /signed/{filename}` route and carry an expiry plus an
//! HMAC-SHA256 tag over `(method, key, expiry)`.

use crate::services::object_store_client::{StorageError, StorageResult};
use async_trait::async_trait;
use axum::http::Method;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{TimeDelta, Utc};
use hmac::{Hmac, Mac, digest::InvalidLength};
use object_store::{path::Path, signer::Signer};
use sha2::Sha256;
use std::{fmt, time::Duration};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const SIGNER_NAME: &str = "LocalSigner";

pub struct LocalSigner {
    base_url: Url,
    mac: HmacSha256,
}

impl LocalSigner {
    /// Build a signer whose links are rooted at `base_url`.
    pub fn new(base_url: Url, secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            base_url,
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Check a link previously produced by [`Signer::signed_url`].
    ///
    /// Only `GET` links are ever minted, so that is the method verified.
    pub fn verify(&self, path: &Path, expires: i64, signature: &str) -> StorageResult<()> {
        if Utc::now().timestamp() > expires {
            return Err(StorageError::SignatureExpired);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StorageError::SignatureInvalid)?;

        let mut mac = self.mac.clone();
        mac.update(signing_message(&Method::GET, path, expires).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| StorageError::SignatureInvalid)
    }

    fn sign(&self, method: &Method, path: &Path, expires: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(signing_message(method, path, expires).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// `{base}/signed/{key}?expires=..&signature=..`, with `/` inside the key
    /// percent-encoded so the key stays a single path segment.
    fn url_for(&self, method: &Method, path: &Path, expires: i64) -> Result<Url, String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| format!("base url `{}` cannot carry a path", self.base_url))?
            .pop_if_empty()
            .push("signed")
            .push(path.as_ref());
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.sign(method, path, expires));
        Ok(url)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn signed_url(
        &self,
        method: Method,
        path: &Path,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        let ttl = TimeDelta::from_std(expires_in).map_err(|err| object_store::Error::Generic {
            store: SIGNER_NAME,
            source: Box::new(err),
        })?;
        let expires = (Utc::now() + ttl).timestamp();

        self.url_for(&method, path, expires)
            .map_err(|msg| object_store::Error::Generic {
                store: SIGNER_NAME,
                source: msg.into(),
            })
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn signing_message(method: &Method, path: &Path, expires: i64) -> String {
    format!("{}\n{}\n{}", method, path, expires)
}
