//! Represents an object (blob) as reported by the remote store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::ObjectMeta;
use serde::Serialize;

/// Metadata for a single object in the remote bucket.
///
/// The proxy keeps no copy of this between requests; the remote store owns
/// existence, size and timestamps. `name` is the storage key, which is also
/// the filename the client uploaded it under.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key inside the bucket.
    pub name: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Timestamp when the store last committed a write to this key.
    pub last_modified: DateTime<Utc>,

    /// Backend-assigned entity tag, when the store reports one.
    pub e_tag: Option<String>,
}

impl From<ObjectMeta> for StoredObject {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            name: meta.location.to_string(),
            size_bytes: meta.size as u64,
            last_modified: meta.last_modified,
            e_tag: meta.e_tag,
        }
    }
}

/// A time-limited URL granting direct read access to one object.
///
/// Minted fresh for every request and never stored.
#[derive(Serialize, Clone, Debug)]
pub struct SignedDownload {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object bytes fetched through a locally signed download link.
#[derive(Debug)]
pub struct DownloadedObject {
    pub object: StoredObject,
    pub content_type: Option<String>,
    pub content: Bytes,
}
