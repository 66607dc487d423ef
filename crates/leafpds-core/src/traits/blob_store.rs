use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PdsResult;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn put_blob(&self, did: &str, cid: &str, data: Bytes, mime_type: &str) -> PdsResult<()>;
    async fn get_blob(&self, did: &str, cid: &str) -> PdsResult<Option<(Bytes, String)>>;
    async fn has_blob(&self, did: &str, cid: &str) -> PdsResult<bool>;
    async fn delete_blob(&self, did: &str, cid: &str) -> PdsResult<()>;
    async fn list_blobs(
        &self,
        did: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> PdsResult<Vec<String>>;
}

/// Tracks which records reference which blobs so that a blob can be
/// garbage-collected once nothing links to it.
#[async_trait]
pub trait BlobRefStore: Send + Sync + 'static {
    /// Record that a blob was uploaded, independent of whether any record
    /// references it yet. Needed so [`BlobRefStore::list_orphans`] can tell
    /// "uploaded but never linked" apart from "never uploaded".
    async fn register_blob(&self, did: &str, blob_cid: &str, mime_type: &str, size: i64) -> PdsResult<()>;
    async fn add_ref(&self, did: &str, blob_cid: &str, record_uri: &str) -> PdsResult<()>;
    async fn remove_ref(&self, did: &str, blob_cid: &str, record_uri: &str) -> PdsResult<()>;
    async fn remove_refs_for_record(&self, did: &str, record_uri: &str) -> PdsResult<()>;
    async fn ref_count(&self, did: &str, blob_cid: &str) -> PdsResult<u64>;
    /// Blob CIDs for `did` with a zero reference count.
    async fn list_orphans(&self, did: &str) -> PdsResult<Vec<String>>;
}
