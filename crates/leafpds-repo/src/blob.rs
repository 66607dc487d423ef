//! Blob upload/download business logic: MIME validation, content-addressed
//! dedup, and reference-count maintenance. Sits above the raw [`BlobStore`]/
//! [`BlobRefStore`] storage traits, which know nothing about MIME types or
//! record linkage.

use std::sync::Arc;

use bytes::Bytes;
use leafpds_core::error::{PdsError, PdsResult};
use leafpds_core::traits::{BlobRefStore, BlobStore};
use leafpds_core::types::BlobMeta;

use crate::blob_refs::diff_blob_refs;
use crate::car::{RAW_CODEC, sha256_cid};

/// MIME types this server accepts for upload (`com.atproto.repo.uploadBlob`).
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
    "video/mp4",
    "video/webm",
    "audio/mpeg",
    "audio/wav",
];

fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Validate magic bytes for image MIME types against the declared type.
/// Non-image types (pdf/video/audio/svg) are not sniffed here; SVG is a
/// text format and is checked for an XML/`<svg` prologue instead.
fn validate_magic_bytes(mime_type: &str, data: &[u8]) -> bool {
    match mime_type {
        "image/jpeg" => data.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/png" => data.starts_with(&[0x89, 0x50, 0x4E, 0x47]),
        "image/gif" => data.starts_with(b"GIF8"),
        "image/webp" => data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP",
        "image/svg+xml" => {
            let head = String::from_utf8_lossy(&data[..data.len().min(256)]);
            let head = head.trim_start();
            head.starts_with("<svg") || head.starts_with("<?xml")
        }
        _ => true,
    }
}

fn cid_for_bytes(data: &[u8]) -> PdsResult<String> {
    Ok(sha256_cid(RAW_CODEC, data)?.to_string())
}

/// Validate, hash, and persist an uploaded blob, returning its descriptor.
/// If a blob with the same content hash already exists for this DID, the
/// existing descriptor is returned without writing again.
pub async fn upload_blob<B: BlobStore + ?Sized, S: BlobRefStore + ?Sized>(
    store: Arc<B>,
    ref_store: Arc<S>,
    did: &str,
    data: Bytes,
    declared_mime: &str,
    max_blob_size: usize,
) -> PdsResult<BlobMeta> {
    if data.len() > max_blob_size {
        return Err(PdsError::BlobTooLarge);
    }
    if !is_allowed_mime(declared_mime) {
        return Err(PdsError::MimeNotAllowed(declared_mime.to_string()));
    }
    if declared_mime.starts_with("image/") && !validate_magic_bytes(declared_mime, &data) {
        return Err(PdsError::MimeMismatch);
    }

    let cid = cid_for_bytes(&data)?;
    let size = data.len() as i64;

    if !store.has_blob(did, &cid).await? {
        store.put_blob(did, &cid, data, declared_mime).await?;
    }
    ref_store.register_blob(did, &cid, declared_mime, size).await?;

    Ok(BlobMeta {
        cid,
        mime_type: declared_mime.to_string(),
        size,
        created_at: chrono::Utc::now(),
    })
}

/// Fetch a blob's bytes and declared MIME type.
pub async fn download_blob<B: BlobStore>(store: Arc<B>, did: &str, cid: &str) -> PdsResult<(Bytes, String)> {
    store.get_blob(did, cid).await?.ok_or(PdsError::BlobNotFound)
}

/// Update blob reference counts after a record write, diffing the
/// record's old and new values for added/removed blob links.
pub async fn sync_blob_refs<S: BlobRefStore + ?Sized>(
    ref_store: &S,
    did: &str,
    record_uri: &str,
    old_value: Option<&serde_json::Value>,
    new_value: Option<&serde_json::Value>,
) -> PdsResult<()> {
    let (added, removed) = diff_blob_refs(old_value, new_value);
    for cid in added {
        ref_store.add_ref(did, &cid, record_uri).await?;
    }
    for cid in removed {
        ref_store.remove_ref(did, &cid, record_uri).await?;
    }
    Ok(())
}

/// Delete every blob with a zero reference count for `did`.
pub async fn sweep_orphans<B, S>(blob_store: &B, ref_store: &S, did: &str) -> PdsResult<u64>
where
    B: BlobStore + ?Sized,
    S: BlobRefStore + ?Sized,
{
    let orphans = ref_store.list_orphans(did).await?;
    for cid in &orphans {
        blob_store.delete_blob(did, cid).await?;
    }
    Ok(orphans.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_magic_bytes_accept_valid_header() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert!(validate_magic_bytes("image/jpeg", &data));
    }

    #[test]
    fn jpeg_magic_bytes_reject_png_header() {
        let data = [0x89, 0x50, 0x4E, 0x47];
        assert!(!validate_magic_bytes("image/jpeg", &data));
    }

    #[test]
    fn webp_requires_riff_and_webp_markers() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"WEBP");
        assert!(validate_magic_bytes("image/webp", &data));
    }

    #[test]
    fn svg_accepts_xml_prologue() {
        let data = b"<?xml version=\"1.0\"?><svg></svg>";
        assert!(validate_magic_bytes("image/svg+xml", data));
    }

    #[test]
    fn non_image_mime_skips_sniffing() {
        assert!(validate_magic_bytes("application/pdf", b"%PDF-1.4"));
    }

    #[test]
    fn disallowed_mime_type_rejected() {
        assert!(!is_allowed_mime("application/x-executable"));
    }

    #[test]
    fn cid_is_deterministic_for_same_bytes() {
        let a = cid_for_bytes(b"hello world").unwrap();
        let b = cid_for_bytes(b"hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cid_differs_for_different_bytes() {
        let a = cid_for_bytes(b"hello").unwrap();
        let b = cid_for_bytes(b"world").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cid_is_valid_cidv1_raw_string() {
        let cid = cid_for_bytes(b"hello world").unwrap();
        let parsed: atrium_repo::Cid = cid.parse().expect("must parse as a real CID");
        assert_eq!(parsed.codec(), 0x55, "blob CIDs use the raw codec");
    }
}
