//! Wraps the external PLC directory's HTTP contract: publishing signed
//! `did:plc` operations for genesis, handle changes, PDS endpoint moves,
//! signing-key rotation, and tombstoning.

use leafpds_core::{PdsError, PdsResult};
use leafpds_crypto::SigningKey;
use leafpds_crypto::did::{
    create_did_plc_operation, create_did_plc_tombstone_operation, create_did_plc_update_operation,
    plc_operation_cid,
};

/// The current published state of a `did:plc` identity, as needed to
/// build the next chained operation (every PLC operation replaces the
/// full document state, not just the changed field).
#[derive(Debug, Clone)]
pub struct PlcDocumentState {
    pub rotation_keys: Vec<String>,
    pub verification_method_atproto: String,
    pub also_known_as: Vec<String>,
    pub pds_endpoint: String,
    pub prev_op_cid: Option<String>,
}

/// Reconstruct a [`PlcDocumentState`] from the JSON served by `GET
/// /{did}/data`, so the next chained operation (e.g. during migration
/// import, repointing a DID at a new PDS) carries forward every field
/// the importing PDS isn't changing.
pub fn document_state_from_plc_data(
    data: &serde_json::Value,
    prev_op_cid: Option<String>,
) -> PdsResult<PlcDocumentState> {
    let rotation_keys = data
        .get("rotationKeys")
        .and_then(|v| v.as_array())
        .ok_or_else(|| PdsError::InvalidOperation("PLC data missing rotationKeys".into()))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let verification_method_atproto = data
        .get("verificationMethods")
        .and_then(|v| v.get("atproto"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| PdsError::InvalidOperation("PLC data missing atproto verification method".into()))?
        .to_string();
    let also_known_as = data
        .get("alsoKnownAs")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let pds_endpoint = data
        .get("services")
        .and_then(|v| v.get("atproto_pds"))
        .and_then(|v| v.get("endpoint"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| PdsError::InvalidOperation("PLC data missing atproto_pds endpoint".into()))?
        .to_string();

    Ok(PlcDocumentState {
        rotation_keys,
        verification_method_atproto,
        also_known_as,
        pds_endpoint,
        prev_op_cid,
    })
}

pub async fn create_did(
    plc_directory_url: &str,
    signing_key: &SigningKey,
    rotation_keys: Vec<String>,
    handle: &str,
    pds_endpoint: &str,
) -> PdsResult<String> {
    let (did, signed_op) = create_did_plc_operation(signing_key, rotation_keys, handle, pds_endpoint)?;
    submit_operation(plc_directory_url, &did, &signed_op).await?;
    Ok(did)
}

pub async fn update_handle(
    plc_directory_url: &str,
    did: &str,
    rotation_key: &SigningKey,
    current: &PlcDocumentState,
    new_handle: &str,
) -> PdsResult<()> {
    let also_known_as = vec![format!("at://{new_handle}")];
    publish_update(plc_directory_url, did, rotation_key, current, also_known_as, current.pds_endpoint.clone())
        .await
}

pub async fn update_pds_endpoint(
    plc_directory_url: &str,
    did: &str,
    rotation_key: &SigningKey,
    current: &PlcDocumentState,
    new_endpoint: &str,
) -> PdsResult<()> {
    publish_update(
        plc_directory_url,
        did,
        rotation_key,
        current,
        current.also_known_as.clone(),
        new_endpoint.to_string(),
    )
    .await
}

pub async fn rotate_signing_key(
    plc_directory_url: &str,
    did: &str,
    rotation_key: &SigningKey,
    current: &PlcDocumentState,
    new_signing_key: &SigningKey,
) -> PdsResult<()> {
    let prev = current
        .prev_op_cid
        .clone()
        .ok_or_else(|| PdsError::InvalidOperation("missing prev operation CID".into()))?;
    let (_did, signed_op) = create_did_plc_update_operation(
        rotation_key,
        &prev,
        current.rotation_keys.clone(),
        new_signing_key.did_key(),
        current.also_known_as.clone(),
        current.pds_endpoint.clone(),
    )?;
    submit_operation(plc_directory_url, did, &signed_op).await
}

pub async fn tombstone(
    plc_directory_url: &str,
    did: &str,
    rotation_key: &SigningKey,
    current: &PlcDocumentState,
) -> PdsResult<()> {
    let prev = current
        .prev_op_cid
        .clone()
        .ok_or_else(|| PdsError::InvalidOperation("missing prev operation CID".into()))?;
    let (_did, signed_op) = create_did_plc_tombstone_operation(rotation_key, &prev)?;
    submit_operation(plc_directory_url, did, &signed_op).await
}

async fn publish_update(
    plc_directory_url: &str,
    did: &str,
    rotation_key: &SigningKey,
    current: &PlcDocumentState,
    also_known_as: Vec<String>,
    pds_endpoint: String,
) -> PdsResult<()> {
    let prev = current
        .prev_op_cid
        .clone()
        .ok_or_else(|| PdsError::InvalidOperation("missing prev operation CID".into()))?;
    let (_did, signed_op) = create_did_plc_update_operation(
        rotation_key,
        &prev,
        current.rotation_keys.clone(),
        current.verification_method_atproto.clone(),
        also_known_as,
        pds_endpoint,
    )?;
    submit_operation(plc_directory_url, did, &signed_op).await
}

async fn submit_operation(plc_directory_url: &str, did: &str, signed_op: &serde_json::Value) -> PdsResult<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| PdsError::InternalError(e.to_string()))?;

    let resp = client
        .post(format!("{plc_directory_url}/{did}"))
        .json(signed_op)
        .send()
        .await
        .map_err(|e| PdsError::DirectoryUnavailable(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(PdsError::InvalidOperation(format!(
            "PLC directory rejected operation ({status}): {body}"
        )));
    }

    Ok(())
}

/// CID to record as `prev` the next time this operation chain is
/// extended.
pub fn operation_cid(signed_op: &serde_json::Value) -> PdsResult<String> {
    plc_operation_cid(signed_op)
}
