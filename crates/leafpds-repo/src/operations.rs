use std::sync::Arc;

use atrium_api::types::string::{Did, Tid};
use atrium_repo::blockstore::AsyncBlockStoreRead;
use atrium_repo::{Cid, Repository};
use futures::TryStreamExt;
use leafpds_core::error::{PdsError, PdsResult};
use leafpds_core::traits::RepoStore;
use leafpds_crypto::{SigningKey, TidGenerator};

use crate::blockstore_adapter::{RepoStoreAdapter, cid_from_bytes, cid_to_bytes};

/// Output returned when a record is created, updated, or put.
#[derive(Debug, Clone)]
pub struct RecordWriteOutput {
    pub uri: String,
    pub cid: Vec<u8>,
    /// New repo root CID bytes after this write, for updating repo_root table.
    pub new_root: Vec<u8>,
    /// New rev string after this write, for updating repo_root table.
    pub new_rev: String,
}

/// Output returned when reading a record.
#[derive(Debug, Clone)]
pub struct RecordOutput {
    pub uri: String,
    pub cid: Vec<u8>,
    pub value: serde_json::Value,
}

/// A single write in an `apply_writes` batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Create {
        collection: String,
        rkey: Option<String>,
        value: serde_json::Value,
    },
    Update {
        collection: String,
        rkey: String,
        value: serde_json::Value,
    },
    Delete {
        collection: String,
        rkey: String,
    },
}

/// Fails `InvalidSwap` if `swap_commit` is set and does not match the
/// repository's current head CID.
fn verify_swap_commit(swap_commit: Option<&[u8]>, root_cid: &Cid) -> PdsResult<()> {
    if let Some(expected) = swap_commit {
        let expected_cid = cid_from_bytes(expected)
            .map_err(|e| PdsError::Storage(format!("invalid swap_commit CID: {e}")))?;
        if expected_cid != *root_cid {
            return Err(PdsError::InvalidSwap);
        }
    }
    Ok(())
}

/// Generate the next rev, retrying until it sorts strictly after `prev_rev`.
///
/// TIDs are monotonic by construction within a single process, but the
/// commit protocol still verifies the ordering explicitly since `rev` is
/// a durable invariant other PDSes rely on when following the firehose.
fn next_rev(tid_gen: &TidGenerator, prev_rev: Option<&str>) -> String {
    loop {
        let candidate = tid_gen.next_tid();
        match prev_rev {
            Some(prev) if candidate.as_str() <= prev => continue,
            _ => return candidate,
        }
    }
}

/// Create a new repository for a DID, returning `(root_cid_bytes, rev_string)`.
///
/// This creates an empty MST, an initial signed commit, and writes everything
/// to the blockstore via the adapter.
pub async fn create_repo<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
) -> PdsResult<(Vec<u8>, String)> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let atrium_did = Did::new(did.to_string())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid DID: {e}")))?;

    let builder = Repository::create(&mut adapter, atrium_did)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to create repo: {e}")))?;

    let commit_bytes = builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;

    let repo = builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize repo: {e}")))?;

    let root_cid = repo.root();
    let rev = repo.commit().rev().to_string();
    let root_cid_bytes = cid_to_bytes(&root_cid);

    Ok((root_cid_bytes, rev))
}

/// Create a new record in a repository.
///
/// If `rkey` is `None`, a new TID-based record key is generated.
/// The record is serialized as DAG-CBOR and stored in the MST at
/// `{collection}/{rkey}`. Fails `RecordExists` if the path is already
/// occupied, or `InvalidSwap` if `swap_commit` is set and stale.
#[allow(clippy::too_many_arguments)]
pub async fn create_record<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: Option<&str>,
    record: &serde_json::Value,
    tid_gen: &TidGenerator,
    current_root: &[u8],
    current_rev: Option<&str>,
    swap_commit: Option<&[u8]>,
) -> PdsResult<RecordWriteOutput> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;
    verify_swap_commit(swap_commit, &root_cid)?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

    let rkey_str = match rkey {
        Some(k) => k.to_string(),
        None => tid_gen.next_tid(),
    };
    let mst_key = format!("{collection}/{rkey_str}");

    if repo
        .tree()
        .get(&mst_key)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
        .is_some()
    {
        return Err(PdsError::RecordExists);
    }

    let (mut commit_builder, record_cid) = repo
        .add_raw(&mst_key, record)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to add record: {e}")))?;

    let rev_str = next_rev(tid_gen, current_rev);
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize commit: {e}")))?;

    Ok(RecordWriteOutput {
        uri: format!("at://{did}/{collection}/{rkey_str}"),
        cid: cid_to_bytes(&record_cid),
        new_root: cid_to_bytes(&new_root_cid),
        new_rev: rev_str,
    })
}

/// Update an existing record. Fails `RecordNotFound` if the path is
/// empty, or `InvalidSwap` if `swap_record`/`swap_commit` don't match.
#[allow(clippy::too_many_arguments)]
pub async fn update_record<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: &str,
    record: &serde_json::Value,
    tid_gen: &TidGenerator,
    current_root: &[u8],
    current_rev: Option<&str>,
    swap_record: Option<&[u8]>,
    swap_commit: Option<&[u8]>,
) -> PdsResult<RecordWriteOutput> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;
    verify_swap_commit(swap_commit, &root_cid)?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");
    let existing = repo
        .tree()
        .get(&mst_key)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
        .ok_or(PdsError::RecordNotFound)?;

    if let Some(expected) = swap_record {
        let expected_cid = cid_from_bytes(expected)
            .map_err(|e| PdsError::Storage(format!("invalid swap_record CID: {e}")))?;
        if expected_cid != existing {
            return Err(PdsError::InvalidSwap);
        }
    }

    let (mut commit_builder, record_cid) = repo
        .update_raw(&mst_key, record)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to update record: {e}")))?;

    let rev_str = next_rev(tid_gen, current_rev);
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize commit: {e}")))?;

    Ok(RecordWriteOutput {
        uri: format!("at://{did}/{collection}/{rkey}"),
        cid: cid_to_bytes(&record_cid),
        new_root: cid_to_bytes(&new_root_cid),
        new_rev: rev_str,
    })
}

/// Get a single record by its AT-URI components.
///
/// Returns `None` if the record does not exist.
pub async fn get_record<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    collection: &str,
    rkey: &str,
    current_root: &[u8],
) -> PdsResult<Option<RecordOutput>> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;

    let maybe_cid = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

        let mst_key = format!("{collection}/{rkey}");
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to get record from MST: {e}")))?
    };

    match maybe_cid {
        Some(record_cid) => {
            let block_data = adapter
                .read_block(record_cid)
                .await
                .map_err(|e| PdsError::Storage(format!("failed to read record block: {e}")))?;

            let value: serde_json::Value = serde_ipld_dagcbor::from_reader(&block_data[..])
                .map_err(|e| PdsError::Storage(format!("failed to decode record: {e}")))?;

            Ok(Some(RecordOutput {
                uri: format!("at://{did}/{collection}/{rkey}"),
                cid: cid_to_bytes(&record_cid),
                value,
            }))
        }
        None => Ok(None),
    }
}

/// List records in a given collection.
///
/// Returns up to `limit` (clamped to 100) records, optionally starting
/// after `cursor` (an rkey), in ascending or descending rkey order.
pub async fn list_records<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    collection: &str,
    limit: usize,
    cursor: Option<&str>,
    reverse: bool,
    current_root: &[u8],
) -> PdsResult<Vec<RecordOutput>> {
    let limit = limit.min(100);
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;

    let prefix = format!("{collection}/");

    let mut entries: Vec<(String, Cid)> = {
        let mut repo = Repository::open(&mut adapter, root_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

        let mut tree = repo.tree();
        let entries_stream = tree.entries_prefixed(&prefix);
        futures::pin_mut!(entries_stream);

        let mut collected = Vec::new();
        while let Some((key, cid)) = entries_stream
            .try_next()
            .await
            .map_err(|e| PdsError::Storage(format!("failed to iterate MST: {e}")))?
        {
            collected.push((key, cid));
        }
        collected
    };

    if reverse {
        entries.reverse();
    }

    let mut filtered = Vec::with_capacity(limit);
    for (key, cid) in entries {
        if filtered.len() >= limit {
            break;
        }
        let rkey = key.strip_prefix(&prefix).unwrap_or(&key);
        if let Some(cursor_rkey) = cursor {
            let past_cursor = if reverse {
                rkey < cursor_rkey
            } else {
                rkey > cursor_rkey
            };
            if !past_cursor {
                continue;
            }
        }
        filtered.push((key, cid));
    }

    let mut results = Vec::with_capacity(filtered.len());
    for (key, record_cid) in filtered {
        let rkey = key.strip_prefix(&prefix).unwrap_or(&key);
        let block_data = adapter
            .read_block(record_cid)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to read record block: {e}")))?;

        let value: serde_json::Value = serde_ipld_dagcbor::from_reader(&block_data[..])
            .map_err(|e| PdsError::Storage(format!("failed to decode record: {e}")))?;

        results.push(RecordOutput {
            uri: format!("at://{did}/{collection}/{rkey}"),
            cid: cid_to_bytes(&record_cid),
            value,
        });
    }

    Ok(results)
}

/// Delete a record from a repository.
///
/// Returns the new root CID bytes and rev string for updating the repo root.
#[allow(clippy::too_many_arguments)]
pub async fn delete_record<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: &str,
    tid_gen: &TidGenerator,
    current_root: &[u8],
    current_rev: Option<&str>,
    swap_record: Option<&[u8]>,
    swap_commit: Option<&[u8]>,
) -> PdsResult<(Vec<u8>, String)> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;
    verify_swap_commit(swap_commit, &root_cid)?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");

    let existing = repo
        .tree()
        .get(&mst_key)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
        .ok_or(PdsError::RecordNotFound)?;

    if let Some(expected) = swap_record {
        let expected_cid = cid_from_bytes(expected)
            .map_err(|e| PdsError::Storage(format!("invalid swap_record CID: {e}")))?;
        if expected_cid != existing {
            return Err(PdsError::InvalidSwap);
        }
    }

    let mut commit_builder = repo
        .delete_raw(&mst_key)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to delete record: {e}")))?;

    let rev_str = next_rev(tid_gen, current_rev);
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize commit: {e}")))?;

    Ok((cid_to_bytes(&new_root_cid), rev_str))
}

/// Create or update a record at a specific rkey (upsert).
///
/// `swap_record` of `None` is only valid when no record currently
/// exists at this path; if set, it must match the existing record CID.
#[allow(clippy::too_many_arguments)]
pub async fn put_record<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
    collection: &str,
    rkey: &str,
    record: &serde_json::Value,
    tid_gen: &TidGenerator,
    current_root: &[u8],
    current_rev: Option<&str>,
    swap_record: Option<&[u8]>,
    swap_commit: Option<&[u8]>,
) -> PdsResult<RecordWriteOutput> {
    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;
    verify_swap_commit(swap_commit, &root_cid)?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

    let mst_key = format!("{collection}/{rkey}");

    let existing = {
        let mut tree = repo.tree();
        tree.get(&mst_key)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
    };

    if let Some(expected) = swap_record {
        let expected_cid = cid_from_bytes(expected)
            .map_err(|e| PdsError::Storage(format!("invalid swap_record CID: {e}")))?;
        match existing {
            Some(current) if current == expected_cid => {}
            _ => return Err(PdsError::InvalidSwap),
        }
    } else if existing.is_some() {
        return Err(PdsError::InvalidSwap);
    }

    let (mut commit_builder, record_cid) = if existing.is_some() {
        repo.update_raw(&mst_key, record)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to update record: {e}")))?
    } else {
        repo.add_raw(&mst_key, record)
            .await
            .map_err(|e| PdsError::Storage(format!("failed to add record: {e}")))?
    };

    let rev_str = next_rev(tid_gen, current_rev);
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize commit: {e}")))?;

    Ok(RecordWriteOutput {
        uri: format!("at://{did}/{collection}/{rkey}"),
        cid: cid_to_bytes(&record_cid),
        new_root: cid_to_bytes(&new_root_cid),
        new_rev: rev_str,
    })
}

/// Apply a batch of creates/updates/deletes as a single commit.
///
/// The whole batch either lands in one commit or fails without touching
/// the repository — a partial write is never observable. Each op is
/// applied against the same open repo handle before a single finalize.
pub async fn apply_writes<R: RepoStore>(
    store: Arc<R>,
    did: &str,
    signing_key: &SigningKey,
    writes: Vec<WriteOp>,
    tid_gen: &TidGenerator,
    current_root: &[u8],
    current_rev: Option<&str>,
    swap_commit: Option<&[u8]>,
) -> PdsResult<(Vec<u8>, String, Vec<RecordWriteOutput>)> {
    if writes.is_empty() {
        return Err(PdsError::InvalidRequest("empty write batch".into()));
    }

    let mut adapter = RepoStoreAdapter::new(store, did.to_string());

    let root_cid = cid_from_bytes(current_root)
        .map_err(|e| PdsError::Storage(format!("invalid root CID: {e}")))?;
    verify_swap_commit(swap_commit, &root_cid)?;

    let mut repo = Repository::open(&mut adapter, root_cid)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to open repo: {e}")))?;

    // (uri, record_cid_bytes); deletes carry an empty cid, the caller
    // only needs the uri to know which path was touched.
    let mut touched: Vec<(String, Vec<u8>)> = Vec::with_capacity(writes.len());
    let mut last_builder = None;

    for write in writes {
        match write {
            WriteOp::Create { collection, rkey, value } => {
                let rkey_str = rkey.unwrap_or_else(|| tid_gen.next_tid());
                let mst_key = format!("{collection}/{rkey_str}");
                if repo
                    .tree()
                    .get(&mst_key)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
                    .is_some()
                {
                    return Err(PdsError::RecordExists);
                }
                let (builder, cid) = repo
                    .add_raw(&mst_key, &value)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to add record: {e}")))?;
                touched.push((format!("at://{did}/{collection}/{rkey_str}"), cid_to_bytes(&cid)));
                last_builder = Some(builder);
            }
            WriteOp::Update { collection, rkey, value } => {
                let mst_key = format!("{collection}/{rkey}");
                if repo
                    .tree()
                    .get(&mst_key)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
                    .is_none()
                {
                    return Err(PdsError::RecordNotFound);
                }
                let (builder, cid) = repo
                    .update_raw(&mst_key, &value)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to update record: {e}")))?;
                touched.push((format!("at://{did}/{collection}/{rkey}"), cid_to_bytes(&cid)));
                last_builder = Some(builder);
            }
            WriteOp::Delete { collection, rkey } => {
                let mst_key = format!("{collection}/{rkey}");
                if repo
                    .tree()
                    .get(&mst_key)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to check existing record: {e}")))?
                    .is_none()
                {
                    return Err(PdsError::RecordNotFound);
                }
                let builder = repo
                    .delete_raw(&mst_key)
                    .await
                    .map_err(|e| PdsError::Storage(format!("failed to delete record: {e}")))?;
                touched.push((format!("at://{did}/{collection}/{rkey}"), Vec::new()));
                last_builder = Some(builder);
            }
        }
    }

    let mut commit_builder = last_builder.expect("writes is non-empty");

    let rev_str = next_rev(tid_gen, current_rev);
    let rev_tid = Tid::new(rev_str.clone())
        .map_err(|e| PdsError::InvalidRequest(format!("invalid TID: {e}")))?;
    commit_builder.rev(rev_tid);
    commit_builder.prev(root_cid);

    let commit_bytes = commit_builder.bytes();
    let sig = signing_key.sign(&commit_bytes)?;
    let new_root_cid = commit_builder
        .finalize(sig)
        .await
        .map_err(|e| PdsError::Storage(format!("failed to finalize commit: {e}")))?;

    let new_root_bytes = cid_to_bytes(&new_root_cid);
    let results = touched
        .into_iter()
        .map(|(uri, cid)| RecordWriteOutput {
            uri,
            cid,
            new_root: new_root_bytes.clone(),
            new_rev: rev_str.clone(),
        })
        .collect();

    Ok((new_root_bytes, rev_str, results))
}
