use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::error::XrpcError;
use crate::state::AppState;
use leafpds_core::traits::*;
use leafpds_core::types::{OAuthCode, OAuthParRequest, OAuthRefreshToken};
use leafpds_crypto::dpop::verify_dpop_proof;
use leafpds_crypto::key_manager::{hash_token, random_token};

// ---------------------------------------------------------------------------
// OAuth Authorization Server Metadata (RFC 8414)
// ---------------------------------------------------------------------------

/// Returns the OAuth Authorization Server metadata document.
///
/// This is served at `/.well-known/oauth-authorization-server`.
pub async fn authorization_server_metadata<A, R, B>(
    State(state): State<AppState<A, R, B>>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let issuer = &state.config.public_url;

    Ok(Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "pushed_authorization_request_endpoint": format!("{issuer}/oauth/par"),
        "revocation_endpoint": format!("{issuer}/oauth/revoke"),
        "introspection_endpoint": format!("{issuer}/oauth/introspect"),
        "jwks_uri": format!("{issuer}/oauth/jwks"),
        "scopes_supported": ["atproto", "transition:generic", "transition:chat.bsky"],
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "subject_types_supported": ["public"],
        "token_endpoint_auth_methods_supported": ["none", "private_key_jwt"],
        "token_endpoint_auth_signing_alg_values_supported": ["ES256", "ES256K"],
        "dpop_signing_alg_values_supported": ["ES256", "ES256K"],
        "code_challenge_methods_supported": ["S256"],
        "require_pushed_authorization_requests": true,
        "require_request_uri_registration": true,
        "client_id_metadata_document_supported": true,
    })))
}

// ---------------------------------------------------------------------------
// OAuth Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

/// Returns the OAuth Protected Resource metadata document.
///
/// This is served at `/.well-known/oauth-protected-resource`.
pub async fn protected_resource_metadata<A, R, B>(
    State(state): State<AppState<A, R, B>>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let resource = &state.config.public_url;

    Ok(Json(json!({
        "resource": resource,
        "authorization_servers": [resource],
        "scopes_supported": ["atproto", "transition:generic", "transition:chat.bsky"],
        "bearer_methods_supported": ["header"],
        "resource_documentation": "https://atproto.com",
    })))
}

// ---------------------------------------------------------------------------
// Pushed Authorization Request (RFC 9126)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ParForm {
    client_id: String,
    redirect_uri: String,
    scope: String,
    code_challenge: String,
    code_challenge_method: String,
}

/// `client_id` must be an `https://` client-metadata-document URL, or
/// `http://localhost` (loopback clients, per the AT Protocol OAuth
/// profile's allowance for native apps during development).
fn validate_client_id(client_id: &str) -> Result<(), XrpcError> {
    let is_https = client_id.starts_with("https://");
    let is_loopback = client_id.starts_with("http://localhost")
        || client_id.starts_with("http://127.0.0.1");
    if !is_https && !is_loopback {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidClient",
            "client_id must be an https:// metadata URL or a loopback URL",
        ));
    }
    Ok(())
}

/// Fetches (and caches, per-process, for five minutes) a client's
/// metadata document so `oauth_token` can re-check `redirect_uri`
/// against it without a second network round trip per request.
async fn fetch_client_metadata<A, R, B>(
    state: &AppState<A, R, B>,
    client_id: &str,
) -> Result<Value, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    if client_id.starts_with("http://localhost") || client_id.starts_with("http://127.0.0.1") {
        return Ok(json!({ "client_id": client_id, "redirect_uris": [] }));
    }
    if let Some(cached) = state.oauth_runtime.cached_client_metadata(client_id) {
        return Ok(cached);
    }
    let client = reqwest::Client::new();
    let metadata: Value = client
        .get(client_id)
        .send()
        .await
        .map_err(|e| XrpcError::new(StatusCode::BAD_GATEWAY, "InvalidClient", e.to_string()))?
        .json()
        .await
        .map_err(|e| XrpcError::new(StatusCode::BAD_GATEWAY, "InvalidClient", e.to_string()))?;
    state
        .oauth_runtime
        .cache_client_metadata(client_id, metadata.clone());
    Ok(metadata)
}

pub async fn oauth_par<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    headers: HeaderMap,
    Form(form): Form<ParForm>,
) -> Result<(StatusCode, Json<Value>), XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    validate_client_id(&form.client_id)?;
    if form.code_challenge_method != "S256" {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "only the S256 code_challenge_method is supported",
        ));
    }

    let metadata = fetch_client_metadata(&state, &form.client_id).await?;
    if let Some(redirect_uris) = metadata.get("redirect_uris").and_then(Value::as_array) {
        let registered = redirect_uris
            .iter()
            .any(|u| u.as_str() == Some(form.redirect_uri.as_str()));
        if !redirect_uris.is_empty() && !registered {
            return Err(XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                "redirect_uri is not registered for this client",
            ));
        }
    }

    let dpop_jkt = match headers.get("dpop").and_then(|v| v.to_str().ok()) {
        Some(proof) => {
            let url = format!("{}/oauth/par", state.config.public_url);
            let verified = verify_dpop_proof(
                proof,
                "POST",
                &url,
                chrono::Utc::now().timestamp(),
                state.config.oauth.dpop_max_age_secs,
            )?;
            Some(verified.jkt)
        }
        None => None,
    };

    let request_uri = format!("urn:ietf:params:oauth:request_uri:{}", random_token(24));
    let par = OAuthParRequest {
        request_uri: request_uri.clone(),
        client_id: form.client_id,
        redirect_uri: form.redirect_uri,
        scope: form.scope,
        code_challenge: form.code_challenge,
        code_challenge_method: form.code_challenge_method,
        dpop_jkt,
        expires_at: chrono::Utc::now()
            + chrono::Duration::seconds(state.config.oauth.par_ttl_secs),
    };
    state.oauth_store.put_par_request(&par).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "request_uri": request_uri,
            "expires_in": state.config.oauth.par_ttl_secs,
        })),
    ))
}

// ---------------------------------------------------------------------------
// Authorization endpoint: render consent, then act on the decision
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    request_uri: String,
}

/// Renders a minimal consent page for the pending PAR request. Requires
/// an existing PDS session (the account that's about to grant access) —
/// this authorization server has no username/password login screen of
/// its own, since account credentials only ever come from the social
/// login provider, so a client must already hold a valid session bearer
/// token before it opens `/oauth/authorize` in a browser context that
/// forwards it (e.g. via a cookie set from `createSession`).
pub async fn oauth_authorize<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    Query(query): Query<AuthorizeQuery>,
    user: AuthenticatedUser,
) -> Result<Html<String>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let par = state
        .oauth_store
        .take_par_request(&query.request_uri)
        .await?
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                "unknown or expired request_uri",
            )
        })?;
    if par.expires_at < chrono::Utc::now() {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "request_uri has expired",
        ));
    }

    let account = state
        .account_store
        .get_account_by_did(&user.did)
        .await?
        .ok_or(leafpds_core::PdsError::AccountNotFound)?;

    let csrf_token = state
        .oauth_runtime
        .issue_consent(par.clone(), user.did.clone(), 300);

    let html = format!(
        r#"<!DOCTYPE html>
<html><head><title>Authorize application</title></head>
<body>
<h1>Authorize access</h1>
<p><strong>{client_id}</strong> is requesting access to <strong>{handle}</strong>'s account.</p>
<p>Requested scope: <code>{scope}</code></p>
<form method="post" action="/oauth/authorize">
<input type="hidden" name="csrf_token" value="{csrf_token}">
<button type="submit" name="decision" value="approve">Approve</button>
<button type="submit" name="decision" value="deny">Deny</button>
</form>
</body></html>"#,
        client_id = html_escape(&par.client_id),
        handle = html_escape(&account.handle),
        scope = html_escape(&par.scope),
        csrf_token = html_escape(&csrf_token),
    );

    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeDecision {
    csrf_token: String,
    decision: String,
}

/// Acts on the user's consent decision: mints a single-use authorization
/// code and redirects to the client's `redirect_uri` on approval, or
/// redirects with `error=access_denied` on denial.
pub async fn oauth_authorize_decide<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    Form(decision): Form<AuthorizeDecision>,
) -> Result<Response, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let pending = state
        .oauth_runtime
        .take_consent(&decision.csrf_token)
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                "unknown or expired csrf_token",
            )
        })?;

    if decision.decision != "approve" {
        let redirect = format!("{}?error=access_denied", pending.par.redirect_uri);
        return Ok(Redirect::to(&redirect).into_response());
    }

    let code = OAuthCode {
        code: random_token(32),
        did: pending.did,
        client_id: pending.par.client_id,
        redirect_uri: pending.par.redirect_uri.clone(),
        scope: pending.par.scope,
        code_challenge: pending.par.code_challenge,
        code_challenge_method: pending.par.code_challenge_method,
        dpop_jkt: pending.par.dpop_jkt,
        expires_at: chrono::Utc::now()
            + chrono::Duration::seconds(state.config.oauth.code_ttl_secs),
    };
    state.oauth_store.put_code(&code).await?;

    let redirect = format!("{}?code={}", pending.par.redirect_uri, code.code);
    Ok(Redirect::to(&redirect).into_response())
}

// ---------------------------------------------------------------------------
// Token endpoint: authorization_code and refresh_token grants
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    grant_type: String,
    code: Option<String>,
    redirect_uri: Option<String>,
    code_verifier: Option<String>,
    refresh_token: Option<String>,
}

fn verify_pkce(code_verifier: &str, code_challenge: &str) -> bool {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::Digest;
    if !(43..=128).contains(&code_verifier.len()) {
        return false;
    }
    let digest = sha2::Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest) == code_challenge
}

async fn require_dpop<A, R, B>(
    state: &AppState<A, R, B>,
    headers: &HeaderMap,
    method: &str,
    path: &str,
) -> Result<leafpds_crypto::dpop::VerifiedDpopProof, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let proof = headers
        .get("dpop")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            XrpcError::new(
                StatusCode::BAD_REQUEST,
                "InvalidDpopProof",
                "DPoP header is required",
            )
        })?;
    let url = format!("{}{}", state.config.public_url, path);
    let verified = verify_dpop_proof(
        proof,
        method,
        &url,
        chrono::Utc::now().timestamp(),
        state.config.oauth.dpop_max_age_secs,
    )?;
    let exp = verified
        .claims
        .exp
        .unwrap_or_else(|| verified.claims.iat + state.config.oauth.dpop_max_age_secs);
    if !state
        .oauth_runtime
        .check_and_record_dpop_jti(&verified.claims.jti, exp)
    {
        return Err(XrpcError::new(
            StatusCode::BAD_REQUEST,
            "InvalidDpopProof",
            "DPoP proof jti has already been used",
        ));
    }
    Ok(verified)
}

pub async fn oauth_token<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let dpop = require_dpop(&state, &headers, "POST", "/oauth/token").await?;

    let (did, client_id, scope, dpop_jkt) = match form.grant_type.as_str() {
        "authorization_code" => {
            let code = form.code.ok_or_else(|| {
                XrpcError::new(StatusCode::BAD_REQUEST, "InvalidGrant", "missing code")
            })?;
            let redirect_uri = form.redirect_uri.ok_or_else(|| {
                XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "missing redirect_uri",
                )
            })?;
            let code_verifier = form.code_verifier.ok_or_else(|| {
                XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "missing code_verifier",
                )
            })?;

            let rec = state
                .oauth_store
                .take_code(&code)
                .await?
                .ok_or_else(|| {
                    XrpcError::new(StatusCode::BAD_REQUEST, "InvalidGrant", "unknown or expired code")
                })?;
            if rec.expires_at < chrono::Utc::now() {
                return Err(XrpcError::new(StatusCode::BAD_REQUEST, "InvalidGrant", "code has expired"));
            }
            if rec.redirect_uri != redirect_uri {
                return Err(XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "redirect_uri mismatch",
                ));
            }
            if let Some(expected_jkt) = &rec.dpop_jkt {
                if *expected_jkt != dpop.jkt {
                    return Err(XrpcError::new(
                        StatusCode::BAD_REQUEST,
                        "InvalidDpopProof",
                        "DPoP key does not match the one bound at authorization time",
                    ));
                }
            }
            if !verify_pkce(&code_verifier, &rec.code_challenge) {
                return Err(XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "PKCE verification failed",
                ));
            }

            (rec.did, rec.client_id, rec.scope, dpop.jkt.clone())
        }
        "refresh_token" => {
            let token = form.refresh_token.ok_or_else(|| {
                XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "missing refresh_token",
                )
            })?;
            let token_hash = hash_token(&token);
            let rec = state
                .oauth_store
                .get_refresh_token(&token_hash)
                .await?
                .ok_or_else(|| {
                    XrpcError::new(StatusCode::BAD_REQUEST, "InvalidGrant", "unknown refresh token")
                })?;
            if rec.expires_at < chrono::Utc::now() {
                state.oauth_store.delete_refresh_token(&token_hash).await?;
                return Err(XrpcError::new(
                    StatusCode::BAD_REQUEST,
                    "InvalidGrant",
                    "refresh token has expired",
                ));
            }
            if let Some(expected_jkt) = &rec.dpop_jkt {
                if *expected_jkt != dpop.jkt {
                    return Err(XrpcError::new(
                        StatusCode::BAD_REQUEST,
                        "InvalidDpopProof",
                        "DPoP key does not match the one bound at issuance",
                    ));
                }
            }
            state.oauth_store.delete_refresh_token(&token_hash).await?;
            (rec.did, rec.client_id, rec.scope, dpop.jkt.clone())
        }
        other => {
            return Err(XrpcError::new(
                StatusCode::BAD_REQUEST,
                "UnsupportedGrantType",
                format!("unsupported grant_type: {other}"),
            ));
        }
    };

    let access_jti = random_token(16);
    let access_token = leafpds_crypto::create_oauth_access_token(
        &state.oauth_runtime.signing_key,
        &state.config.public_url,
        &state.config.public_url,
        &did,
        &client_id,
        &scope,
        &dpop_jkt,
        &access_jti,
        state.config.oauth.access_token_ttl_secs,
    )?;

    let refresh_token = random_token(32);
    let refresh_record = OAuthRefreshToken {
        token_hash: hash_token(&refresh_token),
        did: did.clone(),
        client_id: client_id.clone(),
        scope: scope.clone(),
        dpop_jkt: Some(dpop_jkt),
        expires_at: chrono::Utc::now()
            + chrono::Duration::seconds(state.config.oauth.refresh_token_ttl_secs),
    };
    state.oauth_store.put_refresh_token(&refresh_record).await?;

    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "DPoP",
        "expires_in": state.config.oauth.access_token_ttl_secs,
        "refresh_token": refresh_token,
        "scope": scope,
        "sub": did,
    })))
}

// ---------------------------------------------------------------------------
// Revocation endpoint (RFC 7009)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RevokeForm {
    token: String,
}

/// Always responds `200 {}`, even for an unknown or already-revoked
/// token, per RFC 7009 §2.2 (revocation is idempotent and must not leak
/// whether a token existed).
pub async fn oauth_revoke<A, R, B>(
    State(state): State<AppState<A, R, B>>,
    headers: HeaderMap,
    Form(form): Form<RevokeForm>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let dpop = require_dpop(&state, &headers, "POST", "/oauth/revoke").await?;
    let token_hash = hash_token(&form.token);
    if let Some(rec) = state.oauth_store.get_refresh_token(&token_hash).await? {
        if rec.dpop_jkt.as_deref() == Some(dpop.jkt.as_str()) {
            state.oauth_store.delete_refresh_token(&token_hash).await?;
        }
    }
    Ok(Json(json!({})))
}

// ---------------------------------------------------------------------------
// JSON Web Key Set
// ---------------------------------------------------------------------------

pub async fn oauth_jwks<A, R, B>(
    State(state): State<AppState<A, R, B>>,
) -> Result<Json<Value>, XrpcError>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    let jwk = leafpds_crypto::public_jwk(&state.oauth_runtime.signing_key)?;
    Ok(Json(json!({ "keys": [jwk] })))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
