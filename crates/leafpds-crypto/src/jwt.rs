use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use leafpds_core::{PdsError, PdsResult};
use serde::{Deserialize, Serialize};

const ACCESS_TTL_SECS: i64 = 15 * 60;
const REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionScope {
    Access,
    Refresh,
}

/// Claims shared by the PDS's own first-party session tokens. The
/// `scope` claim distinguishes an access token from a refresh token so
/// one cannot be replayed as the other even though both are signed with
/// related secrets.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub scope: SessionScope,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_access_token(did: &str, jti: &str, secret: &str) -> PdsResult<String> {
    create_session_token(did, jti, SessionScope::Access, ACCESS_TTL_SECS, secret)
}

pub fn create_refresh_token(did: &str, jti: &str, secret: &str) -> PdsResult<String> {
    create_session_token(did, jti, SessionScope::Refresh, REFRESH_TTL_SECS, secret)
}

fn create_session_token(
    did: &str,
    jti: &str,
    scope: SessionScope,
    ttl_secs: i64,
    secret: &str,
) -> PdsResult<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sub: did.to_string(),
        scope,
        jti: jti.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| PdsError::Auth(e.to_string()))
}

/// Validate a session token and enforce it carries `expected_scope`.
/// `jsonwebtoken`'s default validation rejects an expired `exp` outright;
/// callers on the refresh path that need to treat an expired-but-valid
/// signature as "go check the database row" should use
/// [`decode_session_token_ignoring_expiry`] instead.
pub fn validate_session_token(
    token: &str,
    secret: &str,
    expected_scope: SessionScope,
) -> PdsResult<SessionClaims> {
    let claims = decode_session_token(token, secret, true)?;
    if claims.scope != expected_scope {
        return Err(PdsError::Auth("token scope mismatch".into()));
    }
    Ok(claims)
}

/// Decode a refresh token's claims without enforcing `exp`, so the
/// caller can fall back to the authoritative database expiry check (see
/// SPEC_FULL.md §9's refresh-token open question).
pub fn decode_refresh_token_ignoring_expiry(token: &str, secret: &str) -> PdsResult<SessionClaims> {
    let claims = decode_session_token(token, secret, false)?;
    if claims.scope != SessionScope::Refresh {
        return Err(PdsError::Auth("token scope mismatch".into()));
    }
    Ok(claims)
}

fn decode_session_token(token: &str, secret: &str, check_exp: bool) -> PdsResult<SessionClaims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = check_exp;
    let token_data =
        decode::<SessionClaims>(token, &key, &validation).map_err(|e| PdsError::Auth(e.to_string()))?;
    Ok(token_data.claims)
}
