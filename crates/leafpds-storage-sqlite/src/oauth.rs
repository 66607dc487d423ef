use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use leafpds_core::{OAuthCode, OAuthParRequest, OAuthRefreshToken, OAuthStore, PdsError, PdsResult};

#[derive(Clone)]
pub struct SqliteOAuthStore {
    pool: SqlitePool,
}

impl SqliteOAuthStore {
    pub async fn connect(url: &str) -> PdsResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_time(s: &str) -> PdsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PdsError::Storage(format!("failed to parse datetime: {e}")))
}

#[async_trait]
impl OAuthStore for SqliteOAuthStore {
    async fn put_par_request(&self, req: &OAuthParRequest) -> PdsResult<()> {
        sqlx::query(
            "INSERT INTO oauth_par_request \
             (request_uri, client_id, redirect_uri, scope, code_challenge, code_challenge_method, dpop_jkt, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.request_uri)
        .bind(&req.client_id)
        .bind(&req.redirect_uri)
        .bind(&req.scope)
        .bind(&req.code_challenge)
        .bind(&req.code_challenge_method)
        .bind(&req.dpop_jkt)
        .bind(fmt_time(req.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn take_par_request(&self, request_uri: &str) -> PdsResult<Option<OAuthParRequest>> {
        let mut tx = self.pool.begin().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        let row = sqlx::query(
            "SELECT request_uri, client_id, redirect_uri, scope, code_challenge, code_challenge_method, dpop_jkt, expires_at \
             FROM oauth_par_request WHERE request_uri = ?",
        )
        .bind(request_uri)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM oauth_par_request WHERE request_uri = ?")
            .bind(request_uri)
            .execute(&mut *tx)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        let expires_at: String = row.try_get("expires_at").map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(Some(OAuthParRequest {
            request_uri: row.try_get("request_uri").map_err(|e| PdsError::Storage(e.to_string()))?,
            client_id: row.try_get("client_id").map_err(|e| PdsError::Storage(e.to_string()))?,
            redirect_uri: row.try_get("redirect_uri").map_err(|e| PdsError::Storage(e.to_string()))?,
            scope: row.try_get("scope").map_err(|e| PdsError::Storage(e.to_string()))?,
            code_challenge: row.try_get("code_challenge").map_err(|e| PdsError::Storage(e.to_string()))?,
            code_challenge_method: row
                .try_get("code_challenge_method")
                .map_err(|e| PdsError::Storage(e.to_string()))?,
            dpop_jkt: row.try_get("dpop_jkt").map_err(|e| PdsError::Storage(e.to_string()))?,
            expires_at: parse_time(&expires_at)?,
        }))
    }

    async fn put_code(&self, code: &OAuthCode) -> PdsResult<()> {
        sqlx::query(
            "INSERT INTO oauth_code \
             (code, did, client_id, redirect_uri, scope, code_challenge, code_challenge_method, dpop_jkt, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&code.code)
        .bind(&code.did)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.dpop_jkt)
        .bind(fmt_time(code.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn take_code(&self, code: &str) -> PdsResult<Option<OAuthCode>> {
        let mut tx = self.pool.begin().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        let row = sqlx::query(
            "SELECT code, did, client_id, redirect_uri, scope, code_challenge, code_challenge_method, dpop_jkt, expires_at \
             FROM oauth_code WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM oauth_code WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        let expires_at: String = row.try_get("expires_at").map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(Some(OAuthCode {
            code: row.try_get("code").map_err(|e| PdsError::Storage(e.to_string()))?,
            did: row.try_get("did").map_err(|e| PdsError::Storage(e.to_string()))?,
            client_id: row.try_get("client_id").map_err(|e| PdsError::Storage(e.to_string()))?,
            redirect_uri: row.try_get("redirect_uri").map_err(|e| PdsError::Storage(e.to_string()))?,
            scope: row.try_get("scope").map_err(|e| PdsError::Storage(e.to_string()))?,
            code_challenge: row.try_get("code_challenge").map_err(|e| PdsError::Storage(e.to_string()))?,
            code_challenge_method: row
                .try_get("code_challenge_method")
                .map_err(|e| PdsError::Storage(e.to_string()))?,
            dpop_jkt: row.try_get("dpop_jkt").map_err(|e| PdsError::Storage(e.to_string()))?,
            expires_at: parse_time(&expires_at)?,
        }))
    }

    async fn put_refresh_token(&self, token: &OAuthRefreshToken) -> PdsResult<()> {
        sqlx::query(
            "INSERT INTO oauth_refresh_token (token_hash, did, client_id, scope, dpop_jkt, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.token_hash)
        .bind(&token.did)
        .bind(&token.client_id)
        .bind(&token.scope)
        .bind(&token.dpop_jkt)
        .bind(fmt_time(token.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> PdsResult<Option<OAuthRefreshToken>> {
        let row = sqlx::query(
            "SELECT token_hash, did, client_id, scope, dpop_jkt, expires_at \
             FROM oauth_refresh_token WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let expires_at: String =
                    row.try_get("expires_at").map_err(|e| PdsError::Storage(e.to_string()))?;
                Ok(Some(OAuthRefreshToken {
                    token_hash: row.try_get("token_hash").map_err(|e| PdsError::Storage(e.to_string()))?,
                    did: row.try_get("did").map_err(|e| PdsError::Storage(e.to_string()))?,
                    client_id: row.try_get("client_id").map_err(|e| PdsError::Storage(e.to_string()))?,
                    scope: row.try_get("scope").map_err(|e| PdsError::Storage(e.to_string()))?,
                    dpop_jkt: row.try_get("dpop_jkt").map_err(|e| PdsError::Storage(e.to_string()))?,
                    expires_at: parse_time(&expires_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_refresh_token(&self, token_hash: &str) -> PdsResult<()> {
        sqlx::query("DELETE FROM oauth_refresh_token WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn sweep_expired(&self) -> PdsResult<u64> {
        let now = fmt_time(Utc::now());
        let mut total = 0u64;

        let result = sqlx::query("DELETE FROM oauth_par_request WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        total += result.rows_affected();

        let result = sqlx::query("DELETE FROM oauth_code WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        total += result.rows_affected();

        let result = sqlx::query("DELETE FROM oauth_refresh_token WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        total += result.rows_affected();

        Ok(total)
    }
}
