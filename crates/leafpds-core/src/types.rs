use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Deactivated,
    Takendown,
}

/// Key material as stored at rest: AES-256-GCM ciphertext plus the
/// parameters needed to decrypt it with the deployment's key-encryption
/// secret. Never serialized in an API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; 12],
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Secp256k1,
    P256,
}

/// A social identity provider the account authenticated with at signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginProvider {
    GitHub,
    Google,
    /// The account was created by `importAccount` rather than a social
    /// login — there is no external identity provider to key it by.
    Migration,
}

#[derive(Debug, Clone)]
pub struct ActorAccount {
    pub did: String,
    pub handle: String,
    pub email: Option<String>,
    pub provider: LoginProvider,
    pub provider_id: String,
    pub signing_key: EncryptedKey,
    pub rotation_keys: Vec<EncryptedKey>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: AccountStatus,
    pub deactivated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateAccountInput {
    pub did: String,
    pub handle: String,
    pub email: Option<String>,
    pub provider: LoginProvider,
    pub provider_id: String,
    pub signing_key: EncryptedKey,
    pub rotation_keys: Vec<EncryptedKey>,
}

#[derive(Debug, Clone)]
pub struct RepoRoot {
    pub did: String,
    pub cid: Vec<u8>,
    pub rev: String,
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub did: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub next_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub cid: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A single `(blob, record)` reference used for reference-counted
/// retention. One row per record that links to the blob.
#[derive(Debug, Clone)]
pub struct BlobRef {
    pub did: String,
    pub blob_cid: String,
    pub record_uri: String,
}

/// A pending OAuth pushed-authorization request (RFC 9126).
#[derive(Debug, Clone)]
pub struct OAuthParRequest {
    pub request_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub dpop_jkt: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A single-use authorization code minted after user consent.
#[derive(Debug, Clone)]
pub struct OAuthCode {
    pub code: String,
    pub did: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub dpop_jkt: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A persisted, rotatable OAuth refresh token. Only the SHA-256 hash of
/// the bearer value is stored.
#[derive(Debug, Clone)]
pub struct OAuthRefreshToken {
    pub token_hash: String,
    pub did: String,
    pub client_id: String,
    pub scope: String,
    pub dpop_jkt: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A single-use CSRF token bound to a pending PAR request, minted when
/// the consent page is rendered.
#[derive(Debug, Clone)]
pub struct OAuthCsrfToken {
    pub token: String,
    pub request_uri: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A signed token authorizing an account migration to a specific target
/// PDS, minted by `generateMigrationToken`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTokenPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub did: String,
    pub source_pds: String,
    pub target_pds: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
