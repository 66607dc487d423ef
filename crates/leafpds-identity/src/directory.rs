use leafpds_core::{PdsError, PdsResult};

/// Resolve a DID document.
///
/// - `did:plc:*` -> fetch from the configured PLC directory
/// - `did:web:*` -> fetch `https://{domain}/.well-known/did.json`
pub async fn resolve_did(plc_directory_url: &str, did: &str) -> PdsResult<Option<serde_json::Value>> {
    if let Some(plc_id) = did.strip_prefix("did:plc:") {
        if plc_id.is_empty() {
            return Ok(None);
        }
        fetch_json(&format!("{plc_directory_url}/{did}")).await
    } else if let Some(domain) = did.strip_prefix("did:web:") {
        if domain.is_empty() {
            return Ok(None);
        }
        fetch_json(&format!("https://{domain}/.well-known/did.json")).await
    } else {
        Ok(None)
    }
}

/// Fetch the raw PLC operation data for a `did:plc` (rotation keys,
/// verification methods, also-known-as, services) — the shape a new
/// operation is built against, as opposed to the resolved W3C DID
/// document `resolve_did` returns. `did:web` has no such endpoint.
pub async fn fetch_plc_data(plc_directory_url: &str, did: &str) -> PdsResult<Option<serde_json::Value>> {
    if !did.starts_with("did:plc:") {
        return Ok(None);
    }
    fetch_json(&format!("{plc_directory_url}/{did}/data")).await
}

/// Fetch the CID of the most recent operation in a `did:plc`'s log.
///
/// Needed as the `prev` field when publishing the next chained operation
/// (e.g. during account migration import, to point the DID at a new PDS).
/// `did:web` identities have no operation log and always return `None`.
pub async fn last_operation_cid(plc_directory_url: &str, did: &str) -> PdsResult<Option<String>> {
    if !did.starts_with("did:plc:") {
        return Ok(None);
    }
    match fetch_json(&format!("{plc_directory_url}/{did}/log/last")).await? {
        Some(op) => Ok(Some(leafpds_crypto::plc_operation_cid(&op)?)),
        None => Ok(None),
    }
}

async fn fetch_json(url: &str) -> PdsResult<Option<serde_json::Value>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| PdsError::InternalError(e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| PdsError::Upstream(e.to_string()))?;
    if !resp.status().is_success() {
        return Ok(None);
    }
    let doc: serde_json::Value = resp.json().await.map_err(|e| PdsError::Upstream(e.to_string()))?;
    Ok(Some(doc))
}
