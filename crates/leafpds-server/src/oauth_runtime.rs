//! In-process state for the OAuth authorization server that deliberately
//! has no durable-storage counterpart: the server's own signing key (once
//! loaded), a CSRF-token cache for the consent step, and a DPoP `jti`
//! replay cache. `OAuthStore` (leafpds-core) intentionally excludes all
//! of this — see its doc comment — because losing it on restart doesn't
//! violate any invariant, only forces clients to redo an in-flight grant.

use std::collections::HashMap;
use std::sync::Mutex;

use leafpds_core::types::{OAuthCsrfToken, OAuthParRequest};
use leafpds_core::{EncryptedKey, PdsError, PdsResult};
use leafpds_crypto::SigningKey;
use leafpds_crypto::key_manager;

/// A pending consent decision, keyed by the CSRF token minted when the
/// authorize page was rendered. Holds what `oauth_authorize`'s GET step
/// already consumed from `OAuthStore::take_par_request`, since it can't
/// be fetched a second time when the user submits the consent form.
pub struct PendingAuthorize {
    pub par: OAuthParRequest,
    pub did: String,
}

pub struct OAuthRuntime {
    pub signing_key: SigningKey,
    csrf_tokens: Mutex<HashMap<String, (OAuthCsrfToken, PendingAuthorize)>>,
    dpop_jti_seen: Mutex<HashMap<String, i64>>,
    client_metadata_cache: Mutex<HashMap<String, (serde_json::Value, i64)>>,
}

const CLIENT_METADATA_CACHE_TTL_SECS: i64 = 300;

impl OAuthRuntime {
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            csrf_tokens: Mutex::new(HashMap::new()),
            dpop_jti_seen: Mutex::new(HashMap::new()),
            client_metadata_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a CSRF token for a consent form, binding it to the PAR
    /// request and the consenting account's DID.
    pub fn issue_consent(&self, par: OAuthParRequest, did: String, ttl_secs: i64) -> String {
        let token = key_manager::random_token(32);
        let csrf = OAuthCsrfToken {
            token: token.clone(),
            request_uri: par.request_uri.clone(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(ttl_secs),
        };
        self.csrf_tokens
            .lock()
            .unwrap()
            .insert(token.clone(), (csrf, PendingAuthorize { par, did }));
        token
    }

    /// Consumes a consent decision's CSRF token. Single-use: a second
    /// submission with the same token always fails, matching the
    /// single-use semantics `OAuthStore::take_code`/`take_par_request`
    /// already use for the rest of this flow.
    pub fn take_consent(&self, csrf_token: &str) -> Option<PendingAuthorize> {
        let (csrf, pending) = self.csrf_tokens.lock().unwrap().remove(csrf_token)?;
        if csrf.expires_at < chrono::Utc::now() {
            return None;
        }
        Some(pending)
    }

    /// Records a DPoP proof's `jti`. Returns `false` if it has been seen
    /// before within its freshness window (replay).
    pub fn check_and_record_dpop_jti(&self, jti: &str, expires_at: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        let mut seen = self.dpop_jti_seen.lock().unwrap();
        seen.retain(|_, exp| *exp > now);
        if seen.contains_key(jti) {
            return false;
        }
        seen.insert(jti.to_string(), expires_at);
        true
    }

    pub fn cached_client_metadata(&self, client_id: &str) -> Option<serde_json::Value> {
        let now = chrono::Utc::now().timestamp();
        let cache = self.client_metadata_cache.lock().unwrap();
        cache
            .get(client_id)
            .filter(|(_, fetched_at)| now - fetched_at < CLIENT_METADATA_CACHE_TTL_SECS)
            .map(|(metadata, _)| metadata.clone())
    }

    pub fn cache_client_metadata(&self, client_id: &str, metadata: serde_json::Value) {
        let now = chrono::Utc::now().timestamp();
        self.client_metadata_cache
            .lock()
            .unwrap()
            .insert(client_id.to_string(), (metadata, now));
    }
}

/// Loads the authorization server's ES256 signing key from `path`,
/// decrypting it with the deployment's key-encryption secret (the same
/// wrapping scheme `key_manager` uses for account repo keys), or
/// generates and persists a new one on first use.
pub fn load_or_generate_signing_key(path: &str, secret: &str) -> PdsResult<SigningKey> {
    if let Ok(bytes) = std::fs::read(path) {
        let encrypted: EncryptedKey = serde_json::from_slice(&bytes)
            .map_err(|e| PdsError::Crypto(format!("corrupt oauth signing key file: {e}")))?;
        return key_manager::decrypt_key(secret, &encrypted);
    }

    let key = SigningKey::generate_p256()?;
    let encrypted = key_manager::encrypt_key(secret, &key)?;
    let bytes = serde_json::to_vec(&encrypted)
        .map_err(|e| PdsError::Crypto(format!("encode oauth signing key: {e}")))?;
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PdsError::Crypto(format!("create oauth key directory: {e}")))?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| PdsError::Crypto(format!("persist oauth signing key: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_signing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_key.enc");
        let secret = "a very long key encryption secret used in tests";

        let first = load_or_generate_signing_key(path.to_str().unwrap(), secret).unwrap();
        let second = load_or_generate_signing_key(path.to_str().unwrap(), secret).unwrap();
        assert_eq!(first.did_key(), second.did_key());
    }

    #[test]
    fn dpop_jti_replay_is_rejected() {
        let runtime = OAuthRuntime::new(SigningKey::generate_p256().unwrap());
        let exp = chrono::Utc::now().timestamp() + 300;
        assert!(runtime.check_and_record_dpop_jti("jti-1", exp));
        assert!(!runtime.check_and_record_dpop_jti("jti-1", exp));
    }

    #[test]
    fn consent_is_single_use() {
        let runtime = OAuthRuntime::new(SigningKey::generate_p256().unwrap());
        let par = OAuthParRequest {
            request_uri: "urn:ietf:params:oauth:request_uri:abc".into(),
            client_id: "https://client.example/metadata.json".into(),
            redirect_uri: "https://client.example/cb".into(),
            scope: "atproto".into(),
            code_challenge: "challenge".into(),
            code_challenge_method: "S256".into(),
            dpop_jkt: None,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
        };
        let token = runtime.issue_consent(par, "did:plc:alice".into(), 300);
        assert!(runtime.take_consent(&token).is_some());
        assert!(runtime.take_consent(&token).is_none());
    }
}
