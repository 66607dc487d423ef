use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthenticatedUser, JwtRefreshSecret};
use crate::error::XrpcError;
use crate::state::AppState;
use leafpds_core::traits::*;
use leafpds_core::types::{AccountStatus, CreateAccountInput, LoginProvider, RefreshTokenRecord};
use leafpds_core::PdsError;

// ---------------------------------------------------------------------------
// 1. describeServer
// ---------------------------------------------------------------------------

pub async fn describe_server<A, R, B>(
    State(state): State<AppState<A, R, B>>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let did = format!("did:web:{}", state.config.hostname);
    Ok(Json(json!({
        "did": did,
        "availableUserDomains": [state.config.handle_domain.clone()],
        "links": {},
    })))
}

// ---------------------------------------------------------------------------
// 2. createAccount
//
// The OAuth dance with the external identity provider (GitHub/Google) is
// an out-of-scope collaborator (SPEC_FULL §1 Non-goals); this endpoint
// trusts the already-verified `(provider, providerId)` tuple it's handed.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub handle: String,
    pub email: Option<String>,
    pub provider: LoginProvider,
    pub provider_id: String,
}

async fn mint_session<A: AccountStore>(
    state: &AppState<A, impl RepoStore, impl BlobStore>,
    did: &str,
) -> Result<(String, String), XrpcError> {
    let access_jti = uuid::Uuid::new_v4().to_string();
    let access_jwt =
        leafpds_crypto::create_access_token(did, &access_jti, &state.config.jwt.access_secret)
            .map_err(XrpcError::from)?;

    let refresh_jti = uuid::Uuid::new_v4().to_string();
    let refresh_jwt =
        leafpds_crypto::create_refresh_token(did, &refresh_jti, &state.config.jwt.refresh_secret)
            .map_err(XrpcError::from)?;

    let refresh_record = RefreshTokenRecord {
        id: refresh_jti,
        did: did.to_string(),
        expires_at: chrono::Utc::now()
            + chrono::Duration::seconds(state.config.oauth.refresh_token_ttl_secs),
        next_id: None,
    };
    state
        .account_store
        .create_refresh_token(&refresh_record)
        .await?;

    Ok((access_jwt, refresh_jwt))
}

pub async fn create_account<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    // Single-user mode: reject if an account already exists.
    if matches!(state.config.mode, leafpds_core::config::PdsMode::Single) {
        let existing = state.account_store.list_accounts(None, 1).await?;
        if !existing.is_empty() {
            return Err(XrpcError::new(
                StatusCode::BAD_REQUEST,
                "AccountLimitReached",
                "This server is running in single-user mode and already has an account",
            ));
        }
    }

    if !body.handle.ends_with(&state.config.handle_domain) {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidHandle",
            format!("Handle must end with {}", state.config.handle_domain),
        ));
    }
    if state
        .account_store
        .get_account_by_handle(&body.handle)
        .await?
        .is_some()
    {
        return Err(PdsError::HandleAlreadyTaken.into());
    }
    if state
        .account_store
        .get_account_by_provider(&body.provider, &body.provider_id)
        .await?
        .is_some()
    {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "AccountAlreadyExists",
            "An account already exists for this identity provider login",
        ));
    }

    // Signing key used to sign repository commits, plus one independent
    // recovery rotation key — the atproto convention of keeping the PDS's
    // own signing authority separate from the account's root-of-trust key.
    let signing_key = leafpds_crypto::SigningKey::generate_p256().map_err(XrpcError::from)?;
    let recovery_key = leafpds_crypto::SigningKey::generate_k256().map_err(XrpcError::from)?;

    let rotation_key_dids = vec![signing_key.did_key(), recovery_key.did_key()];
    let (did, signed_genesis_op) = leafpds_crypto::create_did_plc_operation(
        &signing_key,
        rotation_key_dids,
        &body.handle,
        &state.config.public_url,
    )
    .map_err(XrpcError::from)?;

    let plc_url = format!(
        "{}/{}",
        state.config.plc_directory_url.trim_end_matches('/'),
        did
    );
    let client = reqwest::Client::new();
    match client.post(&plc_url).json(&signed_genesis_op).send().await {
        Ok(resp) if !resp.status().is_success() => {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!("PLC directory returned non-success status {status}: {text}");
        }
        Err(e) => {
            tracing::warn!("Failed to reach PLC directory at {plc_url}: {e}");
        }
        Ok(_) => {}
    }

    let encrypted_signing_key =
        leafpds_crypto::encrypt_key(&state.config.key_encryption_secret, &signing_key)
            .map_err(XrpcError::from)?;
    let encrypted_recovery_key =
        leafpds_crypto::encrypt_key(&state.config.key_encryption_secret, &recovery_key)
            .map_err(XrpcError::from)?;

    let input = CreateAccountInput {
        did: did.clone(),
        handle: body.handle.clone(),
        email: body.email.clone(),
        provider: body.provider.clone(),
        provider_id: body.provider_id.clone(),
        signing_key: encrypted_signing_key,
        rotation_keys: vec![encrypted_recovery_key],
    };
    state.account_store.create_account(&input).await?;

    let (repo_root_cid, repo_rev) =
        leafpds_repo::create_repo(state.repo_store.clone(), &did, &signing_key)
            .await
            .map_err(|e| {
                XrpcError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    format!("failed to initialize repository: {e}"),
                )
            })?;
    state
        .account_store
        .update_repo_root(&did, &repo_root_cid, &repo_rev)
        .await?;

    let (access_jwt, refresh_jwt) = mint_session(&state, &did).await?;

    Ok(Json(json!({
        "did": did,
        "handle": body.handle,
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
    })))
}

// ---------------------------------------------------------------------------
// 3. createSession
//
// Issued after the social-login flow completes; the caller supplies the
// provider identity the collaborator already verified.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub provider: LoginProvider,
    pub provider_id: String,
}

fn check_account_usable(account: &leafpds_core::types::ActorAccount) -> Result<(), XrpcError> {
    match account.status {
        AccountStatus::Takendown => Err(PdsError::AccountTakendown.into()),
        AccountStatus::Deactivated => Err(PdsError::AccountDeactivated.into()),
        AccountStatus::Active => Ok(()),
    }
}

pub async fn create_session<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let account = state
        .account_store
        .get_account_by_provider(&body.provider, &body.provider_id)
        .await?
        .ok_or(PdsError::AccountNotFound)?;

    check_account_usable(&account)?;

    let (access_jwt, refresh_jwt) = mint_session(&state, &account.did).await?;

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "email": account.email,
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
    })))
}

// ---------------------------------------------------------------------------
// 4. getSession
// ---------------------------------------------------------------------------

pub async fn get_session<A, R, B>(
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

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "email": account.email,
    })))
}

// ---------------------------------------------------------------------------
// 5. refreshSession
// ---------------------------------------------------------------------------

pub async fn refresh_session<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    headers: HeaderMap,
    axum::Extension(refresh_secret): axum::Extension<JwtRefreshSecret>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                "Missing authorization header",
            )
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        XrpcError::new(
            StatusCode::UNAUTHORIZED,
            "AuthenticationRequired",
            "Invalid authorization format",
        )
    })?;

    // The JWT's own exp is ignored here; validity is authoritative via the
    // stored refresh-token row (see DESIGN.md's Open Question decision).
    let claims = leafpds_crypto::decode_refresh_token_ignoring_expiry(token, &refresh_secret.0)
        .map_err(|_| XrpcError::new(StatusCode::UNAUTHORIZED, "InvalidToken", "Invalid refresh token"))?;

    let record = state
        .account_store
        .get_refresh_token(&claims.jti)
        .await?
        .ok_or_else(|| PdsError::Auth("Refresh token not found".to_string()))?;

    if record.expires_at < chrono::Utc::now() {
        state.account_store.delete_refresh_token(&claims.jti).await?;
        return Err(XrpcError::new(
            StatusCode::UNAUTHORIZED,
            "ExpiredToken",
            "Refresh token has expired",
        ));
    }

    let account = state
        .account_store
        .get_account_by_did(&claims.sub)
        .await?
        .ok_or(PdsError::AccountNotFound)?;
    check_account_usable(&account)?;

    state.account_store.delete_refresh_token(&claims.jti).await?;
    let (access_jwt, refresh_jwt) = mint_session(&state, &account.did).await?;

    Ok(Json(json!({
        "did": account.did,
        "handle": account.handle,
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
    })))
}

// ---------------------------------------------------------------------------
// 6. deleteSession
// ---------------------------------------------------------------------------

pub async fn delete_session<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    user: AuthenticatedUser,
) -> Result<StatusCode, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    state
        .account_store
        .delete_refresh_tokens_for_did(&user.did)
        .await?;

    Ok(StatusCode::OK)
}
