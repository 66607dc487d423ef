//! Minting and validating the OAuth authorization server's access tokens
//! (RFC 9068 `at+jwt`), signed with the PDS's own ES256 key and bound to
//! a DPoP key via the `cnf.jkt` claim (RFC 9449 §6.1).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use leafpds_core::{PdsError, PdsResult};

use crate::signing::SigningKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub jkt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAccessClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub scope: String,
    pub client_id: String,
    pub cnf: Confirmation,
}

/// Mint an OAuth access token. `key` must be a P-256 key (ES256); the
/// server's DPoP-binding signing key is separate from any account's
/// repository signing key.
pub fn create_oauth_access_token(
    key: &SigningKey,
    issuer: &str,
    audience: &str,
    subject_did: &str,
    client_id: &str,
    scope: &str,
    jkt: &str,
    jti: &str,
    ttl_secs: i64,
) -> PdsResult<String> {
    let SigningKey::P256(p256_key) = key else {
        return Err(PdsError::Crypto("OAuth access tokens require a P-256 key".into()));
    };
    let now = chrono::Utc::now().timestamp();
    let claims = OAuthAccessClaims {
        iss: issuer.to_string(),
        sub: subject_did.to_string(),
        aud: audience.to_string(),
        jti: jti.to_string(),
        iat: now,
        exp: now + ttl_secs,
        scope: scope.to_string(),
        client_id: client_id.to_string(),
        cnf: Confirmation { jkt: jkt.to_string() },
    };

    let mut header = Header::new(Algorithm::ES256);
    header.typ = Some("at+jwt".to_string());

    let encoding_key = EncodingKey::from_ec_der(&p256_pkcs8_der(p256_key)?);
    encode(&header, &claims, &encoding_key).map_err(|e| PdsError::Crypto(e.to_string()))
}

/// Public JWK for the authorization server's own ES256 signing key, as
/// served from `/oauth/jwks`. Mirrors `dpop::jwk_to_verifying_key` in
/// reverse: decompress the SEC1 point and emit its raw coordinates.
pub fn public_jwk(key: &SigningKey) -> PdsResult<Value> {
    let SigningKey::P256(_) = key else {
        return Err(PdsError::Crypto("oauth signing key must be P-256".into()));
    };
    use p256::ecdsa::VerifyingKey;
    let compressed = key.public_key_bytes();
    let verifying_key = VerifyingKey::from_sec1_bytes(&compressed)
        .map_err(|e| PdsError::Crypto(format!("bad oauth signing key: {e}")))?;
    let point = verifying_key.to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| PdsError::Crypto("oauth signing key missing x coordinate".into()))?;
    let y = point
        .y()
        .ok_or_else(|| PdsError::Crypto("oauth signing key missing y coordinate".into()))?;
    Ok(json!({
        "kty": "EC",
        "crv": "P-256",
        "alg": "ES256",
        "use": "sig",
        "x": URL_SAFE_NO_PAD.encode(x),
        "y": URL_SAFE_NO_PAD.encode(y),
    }))
}

pub fn validate_oauth_access_token(
    token: &str,
    public_key_der: &[u8],
    issuer: &str,
    audience: &str,
) -> PdsResult<OAuthAccessClaims> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    let decoding_key = DecodingKey::from_ec_der(public_key_der);
    let data = decode::<OAuthAccessClaims>(token, &decoding_key, &validation)
        .map_err(|e| PdsError::Auth(e.to_string()))?;
    Ok(data.claims)
}

/// `jsonwebtoken`'s EC encoding key expects a SEC1/PKCS8 DER private key;
/// `atrium_crypto`'s P-256 keypair exports only the raw 32-byte scalar,
/// so this wraps it in a minimal PKCS8 envelope.
fn p256_pkcs8_der(key: &atrium_crypto::keypair::P256Keypair) -> PdsResult<Vec<u8>> {
    use atrium_crypto::keypair::Export;
    let scalar = key.export();
    p256_scalar_to_pkcs8(&scalar)
}

fn p256_scalar_to_pkcs8(scalar: &[u8]) -> PdsResult<Vec<u8>> {
    use p256::SecretKey;
    use p256::pkcs8::EncodePrivateKey;
    let secret_key =
        SecretKey::from_slice(scalar).map_err(|e| PdsError::Crypto(format!("invalid P-256 scalar: {e}")))?;
    secret_key
        .to_pkcs8_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| PdsError::Crypto(format!("PKCS8 encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;

    #[test]
    fn mint_and_validate_roundtrip() {
        let key = SigningKey::generate_p256().unwrap();
        let token = create_oauth_access_token(
            &key,
            "https://pds.test",
            "https://pds.test",
            "did:plc:alice",
            "https://client.example/metadata.json",
            "atproto",
            "thumbprint123",
            "jti-1",
            900,
        )
        .unwrap();

        let SigningKey::P256(p256_key) = &key else { unreachable!() };
        let der = p256_pkcs8_der(p256_key).unwrap();
        let public_der = {
            use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
            let sk = p256::SecretKey::from_pkcs8_der(&der).unwrap();
            sk.public_key().to_public_key_der().unwrap().as_bytes().to_vec()
        };

        let claims = validate_oauth_access_token(&token, &public_der, "https://pds.test", "https://pds.test").unwrap();
        assert_eq!(claims.sub, "did:plc:alice");
        assert_eq!(claims.cnf.jkt, "thumbprint123");
    }

    #[test]
    fn rejects_non_p256_key() {
        let key = SigningKey::generate_k256().unwrap();
        let result = create_oauth_access_token(
            &key, "iss", "aud", "did:plc:x", "client", "atproto", "jkt", "jti", 900,
        );
        assert!(result.is_err());
    }
}
