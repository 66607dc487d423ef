use crate::signing::SigningKey;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use leafpds_core::{PdsError, PdsResult};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Create a did:plc genesis operation.
///
/// Returns `(did, signed_genesis_op)` where:
/// - `did` is the `did:plc:<24-char-base32>` identifier
/// - `signed_genesis_op` is the JSON object with `"sig"` field included
///
/// # Process
///
/// 1. Build an unsigned genesis operation JSON
/// 2. Serialize the unsigned op to DAG-CBOR
/// 3. Sign the DAG-CBOR bytes with the signing key (atrium-crypto handles SHA-256 internally)
/// 4. Base64url-encode the signature (no padding)
/// 5. Add `"sig"` field to the operation
/// 6. Compute the DID: `did:plc:` + first 24 chars of base32-lower(sha256(dag-cbor(signed_op)))
pub fn create_did_plc_operation(
    signing_key: &SigningKey,
    rotation_keys: Vec<String>,
    handle: &str,
    pds_endpoint: &str,
) -> PdsResult<(String, serde_json::Value)> {
    let unsigned_op = json!({
        "type": "plc_operation",
        "rotationKeys": rotation_keys,
        "verificationMethods": {
            "atproto": signing_key.did_key()
        },
        "alsoKnownAs": [format!("at://{handle}")],
        "services": {
            "atproto_pds": {
                "type": "AtprotoPersonalDataServer",
                "endpoint": pds_endpoint
            }
        },
        "prev": null
    });

    sign_and_derive(signing_key, unsigned_op)
}

/// Build and sign a `did:plc` update operation chained to `prev_cid`
/// (the CID of the previous operation for this DID, as base32 multibase
/// string). Used for handle changes, PDS endpoint moves, signing-key
/// rotation and tombstoning — the only difference between these is
/// which fields change relative to the previous operation.
pub fn create_did_plc_update_operation(
    rotation_key: &SigningKey,
    prev_cid: &str,
    rotation_keys: Vec<String>,
    verification_method_atproto: String,
    also_known_as: Vec<String>,
    pds_endpoint: String,
) -> PdsResult<(String, serde_json::Value)> {
    let unsigned_op = json!({
        "type": "plc_operation",
        "rotationKeys": rotation_keys,
        "verificationMethods": {
            "atproto": verification_method_atproto
        },
        "alsoKnownAs": also_known_as,
        "services": {
            "atproto_pds": {
                "type": "AtprotoPersonalDataServer",
                "endpoint": pds_endpoint
            }
        },
        "prev": prev_cid
    });

    sign_and_derive(rotation_key, unsigned_op)
}

/// Build and sign a `did:plc` tombstone operation, terminating the
/// operation chain for a DID.
pub fn create_did_plc_tombstone_operation(
    rotation_key: &SigningKey,
    prev_cid: &str,
) -> PdsResult<(String, serde_json::Value)> {
    let unsigned_op = json!({
        "type": "plc_tombstone",
        "prev": prev_cid,
    });

    sign_and_derive(rotation_key, unsigned_op)
}

fn sign_and_derive(
    signing_key: &SigningKey,
    unsigned_op: Value,
) -> PdsResult<(String, serde_json::Value)> {
    let unsigned_cbor = dag_cbor_encode(&unsigned_op)?;
    let signature = signing_key.sign(&unsigned_cbor)?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(&signature);

    let mut signed_op = match unsigned_op {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    signed_op.insert("sig".to_string(), Value::String(sig_b64));
    let signed_op_value = Value::Object(signed_op);

    let signed_cbor = dag_cbor_encode(&signed_op_value)?;
    let hash = Sha256::digest(&signed_cbor);
    let hash_b32 = base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, &hash);
    let did = format!("did:plc:{}", &hash_b32[..24]);

    Ok((did, signed_op_value))
}

/// Verify a raw signature against a `did:key` public key.
///
/// Only P-256 keys can be checked this way — the stack has no secp256k1
/// verifier, so a `did:key` encoding a K-256 point fails the curve-point
/// check `from_sec1_bytes` performs and this returns `Ok(false)` rather
/// than a hard error, letting callers treat it as "not verified".
pub fn verify_with_did_key(did_key: &str, msg: &[u8], sig: &[u8]) -> PdsResult<bool> {
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    let (_alg, pubkey_bytes) = atrium_crypto::did::parse_did_key(did_key)
        .map_err(|e| PdsError::Crypto(format!("invalid did:key: {e}")))?;

    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&pubkey_bytes) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_slice(sig) else {
        return Ok(false);
    };
    Ok(verifying_key.verify(msg, &signature).is_ok())
}

/// CID (base32, sha256, dag-cbor codec prefix omitted — callers that need
/// a full multiformats CID string should wrap this) of a plc operation,
/// for use as the `prev` of a subsequent operation.
pub fn plc_operation_cid(op: &serde_json::Value) -> PdsResult<String> {
    let cbor = dag_cbor_encode(op)?;
    let hash = Sha256::digest(&cbor);
    Ok(base32::encode(
        base32::Alphabet::Rfc4648Lower { padding: false },
        &hash,
    ))
}

/// Encode a serde_json::Value to DAG-CBOR bytes.
///
/// DAG-CBOR requires deterministic key ordering (sorted) and specific CBOR
/// encoding rules. We convert JSON to ipld_core::ipld::Ipld first, then
/// serialize with serde_ipld_dagcbor.
pub fn dag_cbor_encode(value: &serde_json::Value) -> PdsResult<Vec<u8>> {
    let ipld = json_to_ipld(value);
    serde_ipld_dagcbor::to_vec(&ipld)
        .map_err(|e| PdsError::Crypto(format!("DAG-CBOR encoding failed: {e}")))
}

/// Convert a serde_json::Value to an ipld_core::ipld::Ipld value.
///
/// DAG-CBOR requires maps to have sorted keys. ipld_core::ipld::Ipld uses
/// BTreeMap which provides sorted ordering automatically.
fn json_to_ipld(value: &serde_json::Value) -> ipld_core::ipld::Ipld {
    match value {
        Value::Null => ipld_core::ipld::Ipld::Null,
        Value::Bool(b) => ipld_core::ipld::Ipld::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ipld_core::ipld::Ipld::Integer(i as i128)
            } else if let Some(f) = n.as_f64() {
                ipld_core::ipld::Ipld::Float(f)
            } else {
                ipld_core::ipld::Ipld::Null
            }
        }
        Value::String(s) => ipld_core::ipld::Ipld::String(s.clone()),
        Value::Array(arr) => ipld_core::ipld::Ipld::List(arr.iter().map(json_to_ipld).collect()),
        Value::Object(map) => {
            let btree: std::collections::BTreeMap<String, ipld_core::ipld::Ipld> =
                map.iter().map(|(k, v)| (k.clone(), json_to_ipld(v))).collect();
            ipld_core::ipld::Ipld::Map(btree)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;

    #[test]
    fn create_did_plc_produces_valid_did() {
        let key = SigningKey::generate_p256().unwrap();
        let rotation_keys = vec![key.did_key()];
        let (did, _op) =
            create_did_plc_operation(&key, rotation_keys, "alice.test", "https://pds.test")
                .unwrap();
        assert!(
            did.starts_with("did:plc:"),
            "DID should start with did:plc:, got: {did}"
        );
        assert_eq!(
            did.len(),
            32,
            "did:plc should be 32 chars total, got: {}",
            did.len()
        );
    }

    #[test]
    fn signed_op_has_sig_field() {
        let key = SigningKey::generate_p256().unwrap();
        let rotation_keys = vec![key.did_key()];
        let (_did, op) =
            create_did_plc_operation(&key, rotation_keys, "alice.test", "https://pds.test")
                .unwrap();
        assert!(op.get("sig").is_some(), "signed op must have a 'sig' field");
        assert!(op["sig"].as_str().unwrap().len() > 10, "sig should be non-trivial");
    }

    #[test]
    fn op_has_required_fields() {
        let key = SigningKey::generate_p256().unwrap();
        let rotation_keys = vec![key.did_key()];
        let (_did, op) =
            create_did_plc_operation(&key, rotation_keys, "alice.test", "https://pds.test")
                .unwrap();

        assert_eq!(op["type"], "plc_operation");
        assert!(op["rotationKeys"].is_array());
        assert!(op["verificationMethods"].is_object());
        assert!(op["alsoKnownAs"].is_array());
        assert!(op["services"].is_object());
        assert!(op["prev"].is_null());
    }

    #[test]
    fn deterministic_dag_cbor_encoding() {
        let value = serde_json::json!({"b": 2, "a": 1});
        let enc1 = dag_cbor_encode(&value).unwrap();
        let enc2 = dag_cbor_encode(&value).unwrap();
        assert_eq!(enc1, enc2, "DAG-CBOR encoding should be deterministic");

        let value_reordered = serde_json::json!({"a": 1, "b": 2});
        let enc3 = dag_cbor_encode(&value_reordered).unwrap();
        assert_eq!(enc1, enc3, "key order in JSON should not affect DAG-CBOR output");
    }

    #[test]
    fn tombstone_references_prev() {
        let key = SigningKey::generate_k256().unwrap();
        let (_did, op) = create_did_plc_tombstone_operation(&key, "bafyreiabc").unwrap();
        assert_eq!(op["type"], "plc_tombstone");
        assert_eq!(op["prev"], "bafyreiabc");
        assert!(op.get("sig").is_some());
    }
}
