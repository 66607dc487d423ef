use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use leafpds_core::{
    AccountStatus, AccountStore, ActorAccount, CreateAccountInput, EncryptedKey, KeyType,
    LoginProvider, PdsError, PdsResult, RefreshTokenRecord, RepoRoot,
};

#[derive(Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

/// Parse a SQLite datetime text string into a chrono DateTime<Utc>.
///
/// SQLite stores datetimes as TEXT in the format produced by
/// `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`, which yields strings like
/// `2025-01-01T00:00:00.000Z`.
fn parse_datetime(s: &str) -> Result<chrono::DateTime<Utc>, PdsError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(PdsError::Storage(format!("failed to parse datetime: {s}")))
}

fn parse_datetime_opt(s: Option<&str>) -> Result<Option<chrono::DateTime<Utc>>, PdsError> {
    match s {
        Some(s) => Ok(Some(parse_datetime(s)?)),
        None => Ok(None),
    }
}

fn provider_to_str(provider: &LoginProvider) -> &'static str {
    match provider {
        LoginProvider::GitHub => "github",
        LoginProvider::Google => "google",
        LoginProvider::Migration => "migration",
    }
}

fn provider_from_str(s: &str) -> Result<LoginProvider, PdsError> {
    match s {
        "github" => Ok(LoginProvider::GitHub),
        "google" => Ok(LoginProvider::Google),
        "migration" => Ok(LoginProvider::Migration),
        other => Err(PdsError::Storage(format!("unknown login provider: {other}"))),
    }
}

fn key_type_to_str(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Secp256k1 => "secp256k1",
        KeyType::P256 => "p256",
    }
}

fn key_type_from_str(s: &str) -> Result<KeyType, PdsError> {
    match s {
        "secp256k1" => Ok(KeyType::Secp256k1),
        "p256" => Ok(KeyType::P256),
        other => Err(PdsError::Storage(format!("unknown key type: {other}"))),
    }
}

fn encode_iv(iv: &[u8; 12]) -> Vec<u8> {
    iv.to_vec()
}

fn decode_iv(bytes: &[u8]) -> Result<[u8; 12], PdsError> {
    bytes
        .try_into()
        .map_err(|_| PdsError::Storage("stored IV is not 12 bytes".into()))
}

/// Serialize the rotation-key list as a JSON array of
/// `{ciphertext_hex, iv_hex, key_type}` objects — simple enough not to need
/// a dedicated table, and never queried individually.
fn encode_rotation_keys(keys: &[EncryptedKey]) -> String {
    let values: Vec<serde_json::Value> = keys
        .iter()
        .map(|k| {
            serde_json::json!({
                "ciphertext": hex::encode(&k.ciphertext),
                "iv": hex::encode(k.iv),
                "key_type": key_type_to_str(k.key_type),
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn decode_rotation_keys(raw: &str) -> Result<Vec<EncryptedKey>, PdsError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| PdsError::Storage(format!("bad rotation_keys JSON: {e}")))?;
    values
        .into_iter()
        .map(|v| {
            let ciphertext = hex::decode(v["ciphertext"].as_str().unwrap_or_default())
                .map_err(|e| PdsError::Storage(format!("bad rotation key ciphertext: {e}")))?;
            let iv_bytes = hex::decode(v["iv"].as_str().unwrap_or_default())
                .map_err(|e| PdsError::Storage(format!("bad rotation key iv: {e}")))?;
            let iv = decode_iv(&iv_bytes)?;
            let key_type = key_type_from_str(v["key_type"].as_str().unwrap_or_default())?;
            Ok(EncryptedKey { ciphertext, iv, key_type })
        })
        .collect()
}

fn row_to_actor_account(row: &sqlx::sqlite::SqliteRow) -> Result<ActorAccount, PdsError> {
    let did: String = row.try_get("did").map_err(|e| PdsError::Storage(e.to_string()))?;
    let handle: String = row.try_get("handle").map_err(|e| PdsError::Storage(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let takendown: i64 = row
        .try_get("takendown")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let deactivated_at: Option<String> = row
        .try_get("deactivated_at")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let email: Option<String> = row.try_get("email").map_err(|e| PdsError::Storage(e.to_string()))?;
    let provider_raw: String = row
        .try_get("provider")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let provider_id: String = row
        .try_get("provider_id")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let signing_key: Vec<u8> = row
        .try_get("signing_key")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let signing_key_iv: Vec<u8> = row
        .try_get("signing_key_iv")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let signing_key_type: String = row
        .try_get("signing_key_type")
        .map_err(|e| PdsError::Storage(e.to_string()))?;
    let rotation_keys_raw: String = row
        .try_get("rotation_keys")
        .map_err(|e| PdsError::Storage(e.to_string()))?;

    let status = if takendown != 0 {
        AccountStatus::Takendown
    } else if deactivated_at.is_some() {
        AccountStatus::Deactivated
    } else {
        AccountStatus::Active
    };

    Ok(ActorAccount {
        did,
        handle,
        email,
        provider: provider_from_str(&provider_raw)?,
        provider_id,
        signing_key: EncryptedKey {
            ciphertext: signing_key,
            iv: decode_iv(&signing_key_iv)?,
            key_type: key_type_from_str(&signing_key_type)?,
        },
        rotation_keys: decode_rotation_keys(&rotation_keys_raw)?,
        created_at: parse_datetime(&created_at)?,
        status,
        deactivated_at: parse_datetime_opt(deactivated_at.as_deref())?,
    })
}

const ACCOUNT_SELECT: &str = r#"
    SELECT
        a.did,
        a.handle,
        a.created_at,
        a.takendown,
        a.deactivated_at,
        ac.email,
        ac.provider,
        ac.provider_id,
        ac.signing_key,
        ac.signing_key_iv,
        ac.signing_key_type,
        ac.rotation_keys
    FROM actor a
    INNER JOIN account ac ON a.did = ac.did
"#;

impl SqliteAccountStore {
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

    async fn get_account_where(&self, where_clause: &str, bind_value: &str) -> PdsResult<Option<ActorAccount>> {
        let sql = format!("{ACCOUNT_SELECT} WHERE {where_clause}");
        let row = sqlx::query(&sql)
            .bind(bind_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => Ok(Some(row_to_actor_account(r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn create_account(&self, input: &CreateAccountInput) -> PdsResult<ActorAccount> {
        let mut tx = self.pool.begin().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        sqlx::query("INSERT INTO actor (did, handle) VALUES (?, ?)")
            .bind(&input.did)
            .bind(&input.handle)
            .execute(&mut *tx)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO account (did, email, provider, provider_id, signing_key, signing_key_iv, signing_key_type, rotation_keys) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&input.did)
        .bind(&input.email)
        .bind(provider_to_str(&input.provider))
        .bind(&input.provider_id)
        .bind(&input.signing_key.ciphertext)
        .bind(encode_iv(&input.signing_key.iv))
        .bind(key_type_to_str(input.signing_key.key_type))
        .bind(encode_rotation_keys(&input.rotation_keys))
        .execute(&mut *tx)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        let empty_cid: &[u8] = &[];
        sqlx::query("INSERT INTO repo_root (did, cid, rev) VALUES (?, ?, ?)")
            .bind(&input.did)
            .bind(empty_cid)
            .bind("")
            .execute(&mut *tx)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| PdsError::Storage(e.to_string()))?;

        self.get_account_by_did(&input.did)
            .await?
            .ok_or_else(|| PdsError::Storage("failed to retrieve account after creation".to_string()))
    }

    async fn get_account_by_did(&self, did: &str) -> PdsResult<Option<ActorAccount>> {
        self.get_account_where("a.did = ?", did).await
    }

    async fn get_account_by_handle(&self, handle: &str) -> PdsResult<Option<ActorAccount>> {
        self.get_account_where("a.handle = ?", handle).await
    }

    async fn get_account_by_provider(
        &self,
        provider: &LoginProvider,
        provider_id: &str,
    ) -> PdsResult<Option<ActorAccount>> {
        let sql = format!("{ACCOUNT_SELECT} WHERE ac.provider = ? AND ac.provider_id = ?");
        let row = sqlx::query(&sql)
            .bind(provider_to_str(provider))
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => Ok(Some(row_to_actor_account(r)?)),
            None => Ok(None),
        }
    }

    async fn update_handle(&self, did: &str, handle: &str) -> PdsResult<()> {
        sqlx::query("UPDATE actor SET handle = ? WHERE did = ?")
            .bind(handle)
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn deactivate_account(&self, did: &str) -> PdsResult<()> {
        sqlx::query(
            "UPDATE actor SET deactivated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE did = ?",
        )
        .bind(did)
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn activate_account(&self, did: &str) -> PdsResult<()> {
        sqlx::query("UPDATE actor SET deactivated_at = NULL WHERE did = ?")
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_account(&self, did: &str) -> PdsResult<()> {
        sqlx::query("DELETE FROM actor WHERE did = ?")
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_repo_root(&self, did: &str) -> PdsResult<Option<RepoRoot>> {
        let row = sqlx::query("SELECT did, cid, rev, indexed_at FROM repo_root WHERE did = ?")
            .bind(did)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => {
                let did: String = r.try_get("did").map_err(|e| PdsError::Storage(e.to_string()))?;
                let cid: Vec<u8> = r.try_get("cid").map_err(|e| PdsError::Storage(e.to_string()))?;
                let rev: String = r.try_get("rev").map_err(|e| PdsError::Storage(e.to_string()))?;
                let indexed_at: String = r
                    .try_get("indexed_at")
                    .map_err(|e| PdsError::Storage(e.to_string()))?;

                Ok(Some(RepoRoot {
                    did,
                    cid,
                    rev,
                    indexed_at: parse_datetime(&indexed_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn update_repo_root(&self, did: &str, cid: &[u8], rev: &str) -> PdsResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO repo_root (did, cid, rev, indexed_at) VALUES (?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(did)
        .bind(cid)
        .bind(rev)
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn create_refresh_token(&self, token: &RefreshTokenRecord) -> PdsResult<()> {
        sqlx::query("INSERT INTO refresh_token (id, did, expires_at, next_id) VALUES (?, ?, ?, ?)")
            .bind(&token.id)
            .bind(&token.did)
            .bind(token.expires_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .bind(&token.next_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_refresh_token(&self, id: &str) -> PdsResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query("SELECT id, did, expires_at, next_id FROM refresh_token WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        match row {
            Some(ref r) => {
                let id: String = r.try_get("id").map_err(|e| PdsError::Storage(e.to_string()))?;
                let did: String = r.try_get("did").map_err(|e| PdsError::Storage(e.to_string()))?;
                let expires_at: String = r
                    .try_get("expires_at")
                    .map_err(|e| PdsError::Storage(e.to_string()))?;
                let next_id: Option<String> = r
                    .try_get("next_id")
                    .map_err(|e| PdsError::Storage(e.to_string()))?;

                Ok(Some(RefreshTokenRecord {
                    id,
                    did,
                    expires_at: parse_datetime(&expires_at)?,
                    next_id,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_refresh_token(&self, id: &str) -> PdsResult<()> {
        sqlx::query("DELETE FROM refresh_token WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_refresh_tokens_for_did(&self, did: &str) -> PdsResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_token WHERE did = ?")
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn list_accounts(&self, cursor: Option<&str>, limit: usize) -> PdsResult<Vec<ActorAccount>> {
        let rows = if let Some(cursor) = cursor {
            let sql = format!("{ACCOUNT_SELECT} WHERE a.did > ? ORDER BY a.did ASC LIMIT ?");
            sqlx::query(&sql)
                .bind(cursor)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PdsError::Storage(e.to_string()))?
        } else {
            let sql = format!("{ACCOUNT_SELECT} ORDER BY a.did ASC LIMIT ?");
            sqlx::query(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PdsError::Storage(e.to_string()))?
        };

        rows.iter().map(row_to_actor_account).collect()
    }

    async fn set_takedown(&self, did: &str, takendown: bool) -> PdsResult<()> {
        sqlx::query("UPDATE actor SET takendown = ? WHERE did = ?")
            .bind(takendown as i64)
            .bind(did)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }
}
