use std::sync::Arc;

use atrium_repo::blockstore::{AsyncBlockStoreRead, SHA2_256};
use atrium_repo::{Cid, Multihash, Repository};
use bytes::Bytes;
use leafpds_core::error::{PdsError, PdsResult};
use leafpds_core::traits::{BlobStore, RepoStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blockstore_adapter::{RepoStoreAdapter, cid_from_bytes};
use crate::car_codec::{CarReader, CarWriter};

/// Multicodec code for the `raw` codec (blob bytes, not IPLD).
pub(crate) const RAW_CODEC: u64 = 0x55;
/// Multicodec code for `dag-cbor` (the blob manifest block).
const DAG_CBOR_CODEC: u64 = 0x71;

pub(crate) fn sha256_cid(codec: u64, data: &[u8]) -> PdsResult<Cid> {
    let digest = Sha256::digest(data);
    let mh = Multihash::wrap(SHA2_256, digest.as_slice())
        .map_err(|e| PdsError::IntegrityError(format!("hash wrap failed: {e}")))?;
    Ok(Cid::new_v1(codec, mh))
}

/// Export the full repository as a CAR file (v1).
///
/// The CAR file contains the commit root as the single root CID,
/// followed by all blocks in the repository (commit, MST nodes, record blocks).
pub async fn export_full_car<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    current_root: &[u8],
) -> PdsResult<Vec<u8>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;

    // Open the repository to get the list of all CIDs to export.
    let cids = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

        // export() returns an iterator of all CIDs in the repo (commit + MST + records).
        repo.export()
            .await
            .map_err(|e| PdsError::Storage(format!("failed to export repo CIDs: {e}")))?
            .collect::<Vec<_>>()
    };
    // repo is dropped, adapter is available again

    let mut writer = CarWriter::new(vec![root_cid])?;
    for cid in cids {
        let block = adapter
            .read_block(cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to read block {cid}: {e}")))?;
        writer.write_block(cid, &block);
    }

    Ok(writer.into_bytes())
}

/// Generate a diff CAR containing only blocks changed since a given revision.
///
/// This compares the current repo state with a previous commit CID and returns
/// a CAR file containing only the new/changed blocks.
///
/// If `since_root` is `None`, this behaves identically to `export_full_car`.
pub async fn generate_diff_car<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    current_root: &[u8],
    since_root: Option<&[u8]>,
) -> PdsResult<Vec<u8>> {
    let since_cid = match since_root {
        Some(bytes) => {
            cid_from_bytes(bytes).map_err(|e| PdsError::Storage(format!("invalid since CID: {e}")))?
        }
        None => return export_full_car(store, did, current_root).await,
    };

    let current_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid current root CID: {e}")))?;

    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let current_cids = {
        let mut repo = Repository::open(&mut adapter, current_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to open current repo: {e}")))?;

        repo.export()
            .await
            .map_err(|e| PdsError::Storage(format!("failed to export current CIDs: {e}")))?
            .collect::<std::collections::HashSet<_>>()
    };

    let previous_cids = {
        let mut repo = Repository::open(&mut adapter, since_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to open previous repo: {e}")))?;

        repo.export()
            .await
            .map_err(|e| PdsError::Storage(format!("failed to export previous CIDs: {e}")))?
            .collect::<std::collections::HashSet<_>>()
    };

    let diff_cids: Vec<Cid> = current_cids.difference(&previous_cids).copied().collect();

    let mut writer = CarWriter::new(vec![current_cid])?;
    for cid in diff_cids {
        let block = adapter
            .read_block(cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to read block {cid}: {e}")))?;
        writer.write_block(cid, &block);
    }

    Ok(writer.into_bytes())
}

/// Import every block from a CAR file into `store`, scoped to `did`.
///
/// Used by account migration import and by test fixtures that seed a
/// repository from a recorded CAR. Each block's hash is checked against
/// its CID by [`CarReader`] before it is written, so a corrupted or
/// tampered archive is rejected rather than silently stored.
///
/// Returns the archive's root CID (there must be exactly one).
pub async fn import_car<R: RepoStore>(store: Arc<R>, did: &str, car_bytes: &[u8]) -> PdsResult<Vec<u8>> {
    let mut reader = CarReader::new(car_bytes)?;
    let root = reader
        .roots
        .first()
        .copied()
        .ok_or_else(|| PdsError::IntegrityError("CAR file has no root CID".into()))?;
    if reader.roots.len() != 1 {
        return Err(PdsError::IntegrityError(
            "expected exactly one root CID in CAR file".into(),
        ));
    }

    while let Some((cid, data)) = reader.next_block()? {
        store
            .put_block(did, &cid.to_bytes(), data)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to store imported block: {e}")))?;
    }

    Ok(root.to_bytes())
}

/// One entry in a blob CAR's manifest block: which CID carries which MIME type.
///
/// The CAR format itself has no place for side metadata, so the manifest is
/// encoded as its own dag-cbor block and referenced as the archive's single root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobManifestEntry {
    cid: String,
    mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobManifest {
    blobs: Vec<BlobManifestEntry>,
}

/// Export every blob belonging to `did` as a CAR file.
///
/// The root block is a dag-cbor manifest mapping each blob's CID to its MIME
/// type; every other block is the blob's raw bytes under the `raw` codec,
/// addressed by the sha256 of its content (invariant: a blob's stored bytes
/// hash to its CID under the raw codec with SHA-256).
pub async fn export_blob_car<B: BlobStore + ?Sized>(store: &B, did: &str) -> PdsResult<Vec<u8>> {
    let mut manifest = BlobManifest { blobs: Vec::new() };
    let mut raw_blocks: Vec<(Cid, Bytes)> = Vec::new();

    let mut cursor: Option<String> = None;
    loop {
        let page = store.list_blobs(did, cursor.as_deref(), 500).await?;
        let page_len = page.len();
        for blob_cid in &page {
            let Some((data, mime_type)) = store.get_blob(did, blob_cid).await? else {
                continue;
            };
            let cid = sha256_cid(RAW_CODEC, &data)?;
            manifest.blobs.push(BlobManifestEntry {
                cid: cid.to_string(),
                mime_type,
            });
            raw_blocks.push((cid, data));
        }
        if page_len < 500 {
            break;
        }
        cursor = page.last().cloned();
    }

    let manifest_bytes = serde_ipld_dagcbor::to_vec(&manifest)
        .map_err(|e| PdsError::Storage(format!("failed to encode blob manifest: {e}")))?;
    let manifest_cid = sha256_cid(DAG_CBOR_CODEC, &manifest_bytes)?;

    let mut writer = CarWriter::new(vec![manifest_cid])?;
    writer.write_block(manifest_cid, &manifest_bytes);
    for (cid, data) in raw_blocks {
        writer.write_block(cid, &data);
    }

    Ok(writer.into_bytes())
}

/// Import every blob from a blob CAR produced by [`export_blob_car`] into `store`.
///
/// Returns the number of blobs imported.
pub async fn import_blob_car<B: BlobStore + ?Sized>(
    store: &B,
    did: &str,
    car_bytes: &[u8],
) -> PdsResult<u64> {
    let mut reader = CarReader::new(car_bytes)?;
    let manifest_root = reader
        .roots
        .first()
        .copied()
        .ok_or_else(|| PdsError::IntegrityError("blob CAR has no root CID".into()))?;

    let mut manifest: Option<BlobManifest> = None;
    let mut blocks: std::collections::HashMap<Cid, Bytes> = std::collections::HashMap::new();

    while let Some((cid, data)) = reader.next_block()? {
        if cid == manifest_root {
            manifest = Some(
                serde_ipld_dagcbor::from_slice(data)
                    .map_err(|e| PdsError::IntegrityError(format!("invalid blob manifest: {e}")))?,
            );
        } else {
            blocks.insert(cid, Bytes::copy_from_slice(data));
        }
    }

    let manifest =
        manifest.ok_or_else(|| PdsError::IntegrityError("blob CAR is missing its manifest block".into()))?;

    let mut count = 0u64;
    for entry in manifest.blobs {
        let cid: Cid = entry
            .cid
            .parse()
            .map_err(|e| PdsError::IntegrityError(format!("invalid blob CID in manifest: {e}")))?;
        let Some(data) = blocks.remove(&cid) else {
            return Err(PdsError::IntegrityError(format!(
                "blob CAR manifest references missing block {cid}"
            )));
        };
        store.put_blob(did, &entry.cid, data, &entry.mime_type).await?;
        count += 1;
    }

    Ok(count)
}
