use async_trait::async_trait;

use crate::error::PdsResult;
use crate::types::{OAuthCode, OAuthParRequest, OAuthRefreshToken};

/// Persistence for the OAuth authorization server's short-lived state.
/// In-process caches (CSRF tokens, DPoP `jti` replay, client-metadata)
/// are deliberately not part of this trait — they are advisory and
/// bounded in-memory maps owned by the server crate, not durable state
/// whose loss would violate an invariant.
#[async_trait]
pub trait OAuthStore: Send + Sync + 'static {
    async fn put_par_request(&self, req: &OAuthParRequest) -> PdsResult<()>;
    async fn take_par_request(&self, request_uri: &str) -> PdsResult<Option<OAuthParRequest>>;

    async fn put_code(&self, code: &OAuthCode) -> PdsResult<()>;
    async fn take_code(&self, code: &str) -> PdsResult<Option<OAuthCode>>;

    async fn put_refresh_token(&self, token: &OAuthRefreshToken) -> PdsResult<()>;
    async fn get_refresh_token(&self, token_hash: &str) -> PdsResult<Option<OAuthRefreshToken>>;
    async fn delete_refresh_token(&self, token_hash: &str) -> PdsResult<()>;

    /// Best-effort cleanup of expired PAR requests and codes. Called
    /// periodically; failure is non-fatal.
    async fn sweep_expired(&self) -> PdsResult<u64>;
}
