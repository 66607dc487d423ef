//! Server-side verification of DPoP (RFC 9449) proof JWTs presented by
//! OAuth clients. Unlike a client-side DPoP manager, which generates and
//! signs proofs with a key only it holds, the server only ever parses an
//! untrusted proof, verifies its embedded `jwk`, and computes that JWK's
//! RFC 7638 thumbprint.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use leafpds_core::{PdsError, PdsResult};

#[derive(Debug, Clone, Deserialize)]
pub struct DpopHeader {
    pub alg: String,
    pub typ: String,
    pub jwk: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Present only on proofs bound to a particular access token (the
    /// `ath` claim, SHA-256 of the access token, base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

pub struct VerifiedDpopProof {
    pub claims: DpopClaims,
    /// RFC 7638 JWK thumbprint of the proof's embedded public key.
    pub jkt: String,
}

/// Verify a `DPoP` header's proof JWT against the claimed HTTP method and
/// URL. `now` and `max_age_secs` bound the freshness window (spec: `iat`
/// in `[now - max_age, now + 60]`).
pub fn verify_dpop_proof(
    proof: &str,
    method: &str,
    url: &str,
    now: i64,
    max_age_secs: i64,
) -> PdsResult<VerifiedDpopProof> {
    let parts: Vec<&str> = proof.split('.').collect();
    if parts.len() != 3 {
        return Err(PdsError::InvalidDpopProof("malformed JWT".into()));
    }
    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|_| PdsError::InvalidDpopProof("bad header encoding".into()))?;
    let claims_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| PdsError::InvalidDpopProof("bad payload encoding".into()))?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|_| PdsError::InvalidDpopProof("bad signature encoding".into()))?;

    let header: DpopHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| PdsError::InvalidDpopProof(format!("bad header: {e}")))?;
    if header.typ != "dpop+jwt" {
        return Err(PdsError::InvalidDpopProof("typ must be dpop+jwt".into()));
    }
    if header.alg != "ES256" {
        return Err(PdsError::InvalidDpopProof(format!(
            "unsupported alg: {}",
            header.alg
        )));
    }

    let claims: DpopClaims = serde_json::from_slice(&claims_bytes)
        .map_err(|e| PdsError::InvalidDpopProof(format!("bad claims: {e}")))?;

    if claims.htm.to_uppercase() != method.to_uppercase() {
        return Err(PdsError::InvalidDpopProof("htm mismatch".into()));
    }
    if normalize_url(&claims.htu) != normalize_url(url) {
        return Err(PdsError::InvalidDpopProof("htu mismatch".into()));
    }
    if claims.iat < now - max_age_secs || claims.iat > now + 60 {
        return Err(PdsError::InvalidDpopProof("iat outside acceptable window".into()));
    }

    let verifying_key = jwk_to_verifying_key(&header.jwk)?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|_| PdsError::InvalidDpopProof("bad signature bytes".into()))?;
    let signed_input = format!("{}.{}", parts[0], parts[1]);
    verifying_key
        .verify(signed_input.as_bytes(), &signature)
        .map_err(|_| PdsError::InvalidDpopProof("signature verification failed".into()))?;

    let jkt = jwk_thumbprint(&header.jwk)?;

    Ok(VerifiedDpopProof { claims, jkt })
}

fn normalize_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).trim_end_matches('/').to_string()
}

fn jwk_to_verifying_key(jwk: &Value) -> PdsResult<VerifyingKey> {
    let x = jwk
        .get("x")
        .and_then(Value::as_str)
        .ok_or_else(|| PdsError::InvalidDpopProof("jwk missing x".into()))?;
    let y = jwk
        .get("y")
        .and_then(Value::as_str)
        .ok_or_else(|| PdsError::InvalidDpopProof("jwk missing y".into()))?;
    let x = URL_SAFE_NO_PAD
        .decode(x)
        .map_err(|_| PdsError::InvalidDpopProof("bad jwk.x".into()))?;
    let y = URL_SAFE_NO_PAD
        .decode(y)
        .map_err(|_| PdsError::InvalidDpopProof("bad jwk.y".into()))?;

    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);

    VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| PdsError::InvalidDpopProof("invalid EC point".into()))
}

/// RFC 7638 JWK thumbprint: SHA-256 over the canonical JSON of the
/// required members only, keys sorted lexicographically, no whitespace.
pub fn jwk_thumbprint(jwk: &Value) -> PdsResult<String> {
    let kty = jwk
        .get("kty")
        .and_then(Value::as_str)
        .ok_or_else(|| PdsError::InvalidDpopProof("jwk missing kty".into()))?;

    let canonical = match kty {
        "EC" => {
            let crv = jwk.get("crv").and_then(Value::as_str).unwrap_or("");
            let x = jwk.get("x").and_then(Value::as_str).unwrap_or("");
            let y = jwk.get("y").and_then(Value::as_str).unwrap_or("");
            format!(
                r#"{{"crv":"{crv}","kty":"EC","x":"{x}","y":"{y}"}}"#
            )
        }
        "RSA" => {
            let e = jwk.get("e").and_then(Value::as_str).unwrap_or("");
            let n = jwk.get("n").and_then(Value::as_str).unwrap_or("");
            format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#)
        }
        other => return Err(PdsError::InvalidDpopProof(format!("unsupported kty: {other}"))),
    };

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}
