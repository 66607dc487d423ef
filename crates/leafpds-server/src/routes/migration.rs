//! Account migration: export an account's identity keys, repository and
//! blobs as portable CAR bundles, and import the same bundle on another
//! PDS, optionally repointing the account's `did:plc` at this server.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::error::XrpcError;
use crate::state::AppState;
use leafpds_core::traits::*;
use leafpds_core::types::{CreateAccountInput, EncryptedKey, KeyType, LoginProvider, MigrationTokenPayload};
use leafpds_core::PdsError;
use leafpds_crypto::SigningKey;

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

/// An [`EncryptedKey`] serialized for transport. Ciphertext and IV travel
/// base64-encoded rather than as JSON number arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationKey {
    pub key_type: String,
    pub ciphertext: String,
    pub iv: String,
}

fn key_type_str(kt: KeyType) -> &'static str {
    match kt {
        KeyType::P256 => "p256",
        KeyType::Secp256k1 => "k256",
    }
}

fn key_type_from_str(s: &str) -> Result<KeyType, XrpcError> {
    match s {
        "p256" | "P256" | "ES256" => Ok(KeyType::P256),
        "k256" | "K256" | "secp256k1" | "ES256K" => Ok(KeyType::Secp256k1),
        other => Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            format!("unknown key type: {other}"),
        )),
    }
}

fn encrypted_key_to_wire(k: &EncryptedKey) -> MigrationKey {
    MigrationKey {
        key_type: key_type_str(k.key_type).to_string(),
        ciphertext: BASE64.encode(&k.ciphertext),
        iv: BASE64.encode(k.iv),
    }
}

fn wire_to_encrypted_key(w: &MigrationKey) -> Result<EncryptedKey, XrpcError> {
    let ciphertext = BASE64.decode(&w.ciphertext).map_err(|e| {
        XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid key ciphertext: {e}"))
    })?;
    let iv_vec = BASE64
        .decode(&w.iv)
        .map_err(|e| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid key iv: {e}")))?;
    let iv: [u8; 12] = iv_vec
        .try_into()
        .map_err(|_| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "key iv must be 12 bytes"))?;
    Ok(EncryptedKey {
        ciphertext,
        iv,
        key_type: key_type_from_str(&w.key_type)?,
    })
}

/// A raw private key, only ever present when an export was explicitly
/// asked for with `includePlaintextKeys` — the dangerous, operator-only
/// path. This repo has no separate operator role from account-owner
/// auth, so the gate is the same `AuthenticatedUser` check as the rest
/// of this module (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaintextKey {
    pub key_type: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlaintextKeys {
    pub signing_key: PlaintextKey,
    pub rotation_keys: Vec<PlaintextKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMetadata {
    pub version: u32,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub source_pds: String,
    pub did: String,
    pub handle: String,
    pub signing_key: MigrationKey,
    pub rotation_keys: Vec<MigrationKey>,
    pub repo_head: String,
    pub repo_rev: String,
    pub record_count: u64,
    pub blob_count: u64,
    pub commit_count: u64,
}

// ---------------------------------------------------------------------------
// 1. exportAccountRepo
// ---------------------------------------------------------------------------

pub async fn export_account_repo<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
) -> Result<axum::response::Response, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let repo_root = state
        .account_store
        .get_repo_root(&user.did)
        .await?
        .ok_or(PdsError::AccountNotFound)?;

    let car_bytes =
        leafpds_repo::export_full_car(state.repo_store.clone(), &user.did, &repo_root.cid).await?;

    Ok(axum::response::Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/vnd.ipld.car")
        .body(axum::body::Body::from(car_bytes))
        .unwrap())
}

// ---------------------------------------------------------------------------
// 2. exportAccountBlobs
// ---------------------------------------------------------------------------

pub async fn export_account_blobs<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
) -> Result<axum::response::Response, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let car_bytes = leafpds_repo::export_blob_car(state.blob_store.as_ref(), &user.did).await?;

    Ok(axum::response::Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/vnd.ipld.car")
        .body(axum::body::Body::from(car_bytes))
        .unwrap())
}

// ---------------------------------------------------------------------------
// 3. exportAccountData
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAccountDataQuery {
    #[serde(default)]
    pub include_blobs: bool,
    pub re_encryption_secret: Option<String>,
    #[serde(default)]
    pub include_plaintext_keys: bool,
}

async fn reencrypt_key<A, R, B>(
    state: &AppState<A, R, B>,
    key: &EncryptedKey,
    re_encryption_secret: &Option<String>,
) -> Result<MigrationKey, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    match re_encryption_secret {
        Some(secret) => {
            let sk = leafpds_crypto::decrypt_key(&state.config.key_encryption_secret, key)
                .map_err(XrpcError::from)?;
            let reenc = leafpds_crypto::encrypt_key(secret, &sk).map_err(XrpcError::from)?;
            Ok(encrypted_key_to_wire(&reenc))
        }
        None => Ok(encrypted_key_to_wire(key)),
    }
}

fn plaintext_key_for(key: &EncryptedKey, secret: &str) -> Result<PlaintextKey, XrpcError> {
    let sk = leafpds_crypto::decrypt_key(secret, key).map_err(XrpcError::from)?;
    Ok(PlaintextKey {
        key_type: key_type_str(key.key_type).to_string(),
        private_key: BASE64.encode(sk.to_bytes()),
    })
}

pub async fn export_account_data<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
    Query(params): Query<ExportAccountDataQuery>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let account = state
        .account_store
        .get_account_by_did(&user.did)
        .await?
        .ok_or(PdsError::AccountNotFound)?;
    let repo_root = state
        .account_store
        .get_repo_root(&user.did)
        .await?
        .ok_or(PdsError::AccountNotFound)?;

    let repo_car =
        leafpds_repo::export_full_car(state.repo_store.clone(), &user.did, &repo_root.cid).await?;

    let mut reader = leafpds_repo::CarReader::new(&repo_car)?;
    let mut block_count: u64 = 0;
    while reader.next_block()?.is_some() {
        block_count += 1;
    }
    let record_count = block_count.saturating_sub(1);

    let blob_count = {
        let mut total = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = state.blob_store.list_blobs(&user.did, cursor.as_deref(), 500).await?;
            let page_len = page.len();
            total += page_len as u64;
            if page_len < 500 {
                break;
            }
            cursor = page.last().cloned();
        }
        total
    };

    let signing_key_wire =
        reencrypt_key(&state, &account.signing_key, &params.re_encryption_secret).await?;
    let mut rotation_keys_wire = Vec::with_capacity(account.rotation_keys.len());
    for key in &account.rotation_keys {
        rotation_keys_wire.push(reencrypt_key(&state, key, &params.re_encryption_secret).await?);
    }

    let repo_head = leafpds_repo::cid_from_bytes(&repo_root.cid)
        .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e))?
        .to_string();

    let metadata = MigrationMetadata {
        version: 1,
        exported_at: chrono::Utc::now(),
        source_pds: state.config.public_url.clone(),
        did: account.did.clone(),
        handle: account.handle.clone(),
        signing_key: signing_key_wire,
        rotation_keys: rotation_keys_wire,
        repo_head,
        repo_rev: repo_root.rev.clone(),
        record_count,
        blob_count,
        commit_count: 1,
    };

    let mut response = json!({
        "metadata": metadata,
        "repoCar": BASE64.encode(&repo_car),
    });

    if params.include_blobs {
        let blob_car = leafpds_repo::export_blob_car(state.blob_store.as_ref(), &user.did).await?;
        response["blobCar"] = json!(BASE64.encode(&blob_car));
    }

    if params.include_plaintext_keys {
        let plaintext = MigrationPlaintextKeys {
            signing_key: plaintext_key_for(&account.signing_key, &state.config.key_encryption_secret)?,
            rotation_keys: account
                .rotation_keys
                .iter()
                .map(|k| plaintext_key_for(k, &state.config.key_encryption_secret))
                .collect::<Result<Vec<_>, _>>()?,
        };
        response["plaintextKeys"] = json!(plaintext);
    }

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// 4. generateMigrationToken
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMigrationTokenRequest {
    pub target_pds: String,
}

const MIGRATION_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

fn build_migration_token(payload: &MigrationTokenPayload, rotation_key: &SigningKey) -> Result<String, XrpcError> {
    let header = json!({ "alg": rotation_key.algorithm(), "typ": "migration+jwt" });
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header)
            .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e.to_string()))?,
    );
    let payload_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(payload)
            .map_err(|e| XrpcError::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", e.to_string()))?,
    );
    let signing_input = format!("{header_b64}.{payload_b64}");
    let sig = rotation_key.sign(signing_input.as_bytes()).map_err(XrpcError::from)?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(sig);
    Ok(format!("{signing_input}.{sig_b64}"))
}

/// Split a migration token into `(payload, signing_input, signature_bytes)`
/// without checking the signature — callers decide what to verify against.
fn decode_migration_token(token: &str) -> Result<(MigrationTokenPayload, String, Vec<u8>), XrpcError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "malformed migration token"));
    }
    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid migration token payload encoding: {e}"))
    })?;
    let payload: MigrationTokenPayload = serde_json::from_slice(&payload_bytes).map_err(|e| {
        XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid migration token payload: {e}"))
    })?;
    let sig_bytes = URL_SAFE_NO_PAD.decode(parts[2]).map_err(|e| {
        XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid migration token signature encoding: {e}"))
    })?;
    Ok((payload, format!("{}.{}", parts[0], parts[1]), sig_bytes))
}

pub async fn generate_migration_token<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
    Json(body): Json<GenerateMigrationTokenRequest>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let account = state
        .account_store
        .get_account_by_did(&user.did)
        .await?
        .ok_or(PdsError::AccountNotFound)?;

    let rotation_key = account
        .rotation_keys
        .first()
        .ok_or_else(|| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "account has no rotation key"))?;
    let rotation_signing_key =
        leafpds_crypto::decrypt_key(&state.config.key_encryption_secret, rotation_key).map_err(XrpcError::from)?;

    let now = chrono::Utc::now();
    let payload = MigrationTokenPayload {
        kind: "account_migration".to_string(),
        did: account.did.clone(),
        source_pds: state.config.public_url.clone(),
        target_pds: body.target_pds,
        issued_at: now,
        expires_at: now + chrono::Duration::seconds(MIGRATION_TOKEN_TTL_SECS),
    };

    let token = build_migration_token(&payload, &rotation_signing_key)?;
    Ok(Json(json!({ "token": token, "expiresAt": payload.expires_at })))
}

// ---------------------------------------------------------------------------
// 5. importAccount
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccountRequest {
    pub metadata: MigrationMetadata,
    pub repo_car: String,
    pub blob_car: Option<String>,
    pub plaintext_keys: Option<MigrationPlaintextKeys>,
    pub migration_token: Option<String>,
    pub re_encryption_secret: Option<String>,
    #[serde(default)]
    pub skip_did_update: bool,
    #[serde(default)]
    pub force_handle_change: bool,
}

fn plaintext_to_signing_key(key: &PlaintextKey) -> Result<SigningKey, XrpcError> {
    let bytes = BASE64
        .decode(&key.private_key)
        .map_err(|e| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid plaintext key: {e}")))?;
    SigningKey::from_bytes(&key.key_type, &bytes).map_err(XrpcError::from)
}

/// Recover the usable signing keys from whichever key-transfer path the
/// export used: plaintext (dangerous, operator-initiated export) takes
/// precedence, otherwise the keys are decrypted with `re_encryption_secret`.
fn recover_keys(
    metadata: &MigrationMetadata,
    plaintext_keys: &Option<MigrationPlaintextKeys>,
    re_encryption_secret: &Option<String>,
) -> Result<(SigningKey, Vec<SigningKey>), XrpcError> {
    if let Some(plaintext) = plaintext_keys {
        let signing_key = plaintext_to_signing_key(&plaintext.signing_key)?;
        let rotation_keys = plaintext
            .rotation_keys
            .iter()
            .map(plaintext_to_signing_key)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((signing_key, rotation_keys));
    }

    let secret = re_encryption_secret.as_deref().ok_or_else(|| {
        XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "reEncryptionSecret or plaintextKeys is required to import key material",
        )
    })?;
    let signing_key_enc = wire_to_encrypted_key(&metadata.signing_key)?;
    let signing_key = leafpds_crypto::decrypt_key(secret, &signing_key_enc).map_err(XrpcError::from)?;
    let mut rotation_keys = Vec::with_capacity(metadata.rotation_keys.len());
    for wire in &metadata.rotation_keys {
        let enc = wire_to_encrypted_key(wire)?;
        rotation_keys.push(leafpds_crypto::decrypt_key(secret, &enc).map_err(XrpcError::from)?);
    }
    Ok((signing_key, rotation_keys))
}

pub async fn import_account<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    Json(body): Json<ImportAccountRequest>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let mut warnings: Vec<String> = Vec::new();

    if state.account_store.get_account_by_did(&body.metadata.did).await?.is_some() {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "AccountAlreadyExists",
            "an account already exists for this DID",
        ));
    }

    if let Some(token) = &body.migration_token {
        let (payload, signing_input, sig) = decode_migration_token(token)?;
        if payload.kind != "account_migration" {
            return Err(XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "not a migration token"));
        }
        if payload.did != body.metadata.did {
            return Err(XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "migration token DID mismatch"));
        }
        if payload.target_pds != state.config.public_url {
            return Err(XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                "migration token was not issued for this PDS",
            ));
        }
        if payload.expires_at < chrono::Utc::now() {
            return Err(XrpcError::new(StatusCode::BAD_REQUEST, "ExpiredToken", "migration token has expired"));
        }

        match leafpds_identity::fetch_plc_data(&state.config.plc_directory_url, &payload.did).await {
            Ok(Some(data)) => {
                let rotation_keys = data
                    .get("rotationKeys")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
                    .unwrap_or_default();
                let verified = rotation_keys.iter().any(|did_key| {
                    leafpds_crypto::verify_with_did_key(did_key, signing_input.as_bytes(), &sig)
                        .unwrap_or(false)
                });
                if !verified {
                    warnings.push(
                        "migration token signature could not be verified against the source DID's published rotation keys"
                            .to_string(),
                    );
                }
            }
            Ok(None) => warnings.push("source DID has no published PLC operation data to verify the migration token against".to_string()),
            Err(e) => warnings.push(format!("could not fetch source DID's PLC data to verify migration token: {e}")),
        }
    } else {
        warnings.push("no migration token supplied; import proceeded without source-PDS authorization".to_string());
    }

    let resolved = leafpds_identity::resolve_did(&state.config.plc_directory_url, &body.metadata.did)
        .await
        .map_err(XrpcError::from)?;
    if resolved.is_none() {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "source DID is not resolvable",
        ));
    }

    leafpds_identity::validate_handle(&body.metadata.handle)
        .map_err(|_| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidHandle", "invalid handle in metadata"))?;

    let handle_taken = state
        .account_store
        .get_account_by_handle(&body.metadata.handle)
        .await?
        .is_some();
    let handle = if handle_taken {
        if !body.force_handle_change {
            return Err(PdsError::HandleAlreadyTaken.into());
        }
        let account_store = &state.account_store;
        leafpds_identity::allocate_unique_handle(&body.metadata.handle, &state.config.handle_domain, |candidate| async move {
            Ok(account_store.get_account_by_handle(&candidate).await?.is_some())
        })
        .await
        .map_err(XrpcError::from)?
    } else {
        body.metadata.handle.clone()
    };

    let (signing_key, rotation_keys) =
        recover_keys(&body.metadata, &body.plaintext_keys, &body.re_encryption_secret)?;

    let encrypted_signing_key =
        leafpds_crypto::encrypt_key(&state.config.key_encryption_secret, &signing_key).map_err(XrpcError::from)?;
    let mut encrypted_rotation_keys = Vec::with_capacity(rotation_keys.len());
    for key in &rotation_keys {
        encrypted_rotation_keys
            .push(leafpds_crypto::encrypt_key(&state.config.key_encryption_secret, key).map_err(XrpcError::from)?);
    }

    let input = CreateAccountInput {
        did: body.metadata.did.clone(),
        handle: handle.clone(),
        email: None,
        provider: LoginProvider::Migration,
        provider_id: body.metadata.did.clone(),
        signing_key: encrypted_signing_key,
        rotation_keys: encrypted_rotation_keys,
    };
    state.account_store.create_account(&input).await?;

    let repo_car_bytes = BASE64
        .decode(&body.repo_car)
        .map_err(|e| XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid repoCar encoding: {e}")))?;
    let imported_root =
        leafpds_repo::import_car(state.repo_store.clone(), &body.metadata.did, &repo_car_bytes).await?;
    state
        .account_store
        .update_repo_root(&body.metadata.did, &imported_root, &body.metadata.repo_rev)
        .await?;

    let mut blobs_imported = 0u64;
    if let Some(blob_car_b64) = &body.blob_car {
        let blob_car_bytes = BASE64.decode(blob_car_b64).map_err(|e| {
            XrpcError::new(StatusCode::BAD_REQUEST, "InvalidRequest", format!("invalid blobCar encoding: {e}"))
        })?;
        blobs_imported =
            leafpds_repo::import_blob_car(state.blob_store.as_ref(), &body.metadata.did, &blob_car_bytes).await?;
    }

    if !body.skip_did_update {
        match leafpds_identity::fetch_plc_data(&state.config.plc_directory_url, &body.metadata.did).await {
            Ok(Some(data)) => {
                let prev = leafpds_identity::last_operation_cid(&state.config.plc_directory_url, &body.metadata.did)
                    .await
                    .ok()
                    .flatten();
                match leafpds_identity::document_state_from_plc_data(&data, prev) {
                    Ok(current_state) => {
                        if let Some(rotation_key) = rotation_keys.first() {
                            if let Err(e) = leafpds_identity::registrar::update_pds_endpoint(
                                &state.config.plc_directory_url,
                                &body.metadata.did,
                                rotation_key,
                                &current_state,
                                &state.config.public_url,
                            )
                            .await
                            {
                                warnings.push(format!("failed to repoint DID at this PDS: {e}"));
                            }
                        } else {
                            warnings.push("no rotation key available to sign the DID repoint operation".to_string());
                        }
                    }
                    Err(e) => warnings.push(format!("could not parse source DID's PLC data: {e}")),
                }
            }
            Ok(None) => warnings.push("source DID has no PLC operation data; skipped repointing it at this PDS".to_string()),
            Err(e) => warnings.push(format!("could not fetch source DID's PLC data: {e}")),
        }
    }

    if let Some(ref sequencer) = state.sequencer {
        use crate::firehose::events::{AccountEvent, FirehoseEvent};
        let seq = sequencer.next_seq();
        let event = FirehoseEvent::Account(AccountEvent {
            seq,
            did: body.metadata.did.clone(),
            time: chrono::Utc::now().to_rfc3339(),
            active: true,
            status: None,
        });
        crate::firehose::emit::emit_and_persist(&state, event).await;
    }

    Ok(Json(json!({
        "did": body.metadata.did,
        "handle": handle,
        "recordsImported": body.metadata.record_count,
        "blobsImported": blobs_imported,
        "warnings": warnings,
    })))
}

// ---------------------------------------------------------------------------
// 6. checkAccountStatus
// ---------------------------------------------------------------------------

pub async fn check_account_status<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let account = state
        .account_store
        .get_account_by_did(&user.did)
        .await?
        .ok_or(PdsError::AccountNotFound)?;
    let repo_root = state.account_store.get_repo_root(&user.did).await?;

    let valid_did = match leafpds_identity::resolve_did(&state.config.plc_directory_url, &user.did).await {
        Ok(Some(doc)) => doc
            .get("service")
            .and_then(|s| s.as_array())
            .map(|services| {
                services.iter().any(|svc| {
                    svc.get("serviceEndpoint")
                        .and_then(|e| e.as_str())
                        .map(|e| e.trim_end_matches('/') == state.config.public_url.trim_end_matches('/'))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false),
        _ => false,
    };

    let blob_count = {
        let mut total = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = state.blob_store.list_blobs(&user.did, cursor.as_deref(), 500).await?;
            let page_len = page.len();
            total += page_len as u64;
            if page_len < 500 {
                break;
            }
            cursor = page.last().cloned();
        }
        total
    };

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "activated": matches!(account.status, leafpds_core::AccountStatus::Active),
        "validDid": valid_did,
        "repoCommit": repo_root.as_ref().map(|r| leafpds_repo::cid_from_bytes(&r.cid).ok().map(|c| c.to_string())).flatten(),
        "repoRev": repo_root.as_ref().map(|r| r.rev.clone()),
        "expectedBlobs": blob_count,
        "importedBlobs": blob_count,
    })))
}
