//! Refresh token ledger.
//!
//! Each row is one link in a per-device rotation chain. Raw secrets are never
//! stored, only SHA-256 hex digests. Rotation marks the current link revoked
//! and points `replaced_by_token_id` at its successor; that pair of fields is
//! the reuse-detection signal. A row revoked at logout keeps a null
//! `replaced_by_token_id` on purpose — logout is not an attack signal.

use sqlx::sqlite::SqlitePool;

/// Client metadata captured when a chain link is created.
#[derive(Debug, Clone, Default)]
pub struct DeviceMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
}

/// One link in a refresh token rotation chain.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub last_used_at: Option<i64>,
    pub replaced_by_token_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
}

impl RefreshToken {
    /// Build a fresh chain link. Timestamps are stamped by the caller.
    pub fn new(
        user_id: i64,
        token_hash: String,
        created_at: i64,
        expires_at: i64,
        meta: &DeviceMeta,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token_hash,
            created_at,
            expires_at,
            revoked_at: None,
            last_used_at: None,
            replaced_by_token_id: None,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            device_name: meta.device_name.clone(),
        }
    }

    /// A link is active while unrevoked and unexpired.
    pub fn is_active(&self, now: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Revoked with a successor link: the reuse-detection signal.
    pub fn is_rotated(&self) -> bool {
        self.revoked_at.is_some() && self.replaced_by_token_id.is_some()
    }
}

/// Store for the refresh token ledger.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, created_at, expires_at, revoked_at, \
     last_used_at, replaced_by_token_id, ip, user_agent, device_name";

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new chain link.
    pub async fn insert(&self, token: &RefreshToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at, ip, user_agent, device_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(&token.ip)
        .bind(&token.user_agent)
        .bind(&token.device_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new chain link inside an open transaction.
    pub async fn insert_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        token: &RefreshToken,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at, ip, user_agent, device_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(&token.ip)
        .bind(&token.user_agent)
        .bind(&token.device_name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Look up a chain link by the digest of its raw secret.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, sqlx::Error> {
        let row: Option<RefreshToken> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_tokens WHERE token_hash = ?",
            TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Claim a link for rotation: stamp last_used_at and revoked_at, but only
    /// if it is still unrevoked. Returns false when a concurrent rotation got
    /// there first; the caller must then treat the presented secret as reused
    /// rather than overwrite the winner's link.
    pub async fn mark_rotated(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &str,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET last_used_at = ?, revoked_at = ?
             WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point a rotated link at its successor.
    pub async fn link_successor(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &str,
        successor_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE refresh_tokens SET replaced_by_token_id = ? WHERE id = ?")
            .bind(successor_id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Revoke a single link without a successor (logout). Idempotent: a link
    /// that is already revoked is left untouched.
    pub async fn revoke(&self, id: &str, now: i64) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active link for a user (logout-all, password change or
    /// reset, reuse teardown). Returns the number of links revoked.
    pub async fn revoke_all_for_user(&self, user_id: i64, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count a user's currently active links.
    pub async fn count_active_for_user(&self, user_id: i64, now: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens
             WHERE user_id = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// List all of a user's links, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, sqlx::Error> {
        let rows: Vec<RefreshToken> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_tokens WHERE user_id = ? ORDER BY created_at DESC",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete links whose expiry is older than `cutoff`. The grace window
    /// between expiry and deletion keeps the expired-vs-unknown error
    /// distinction for recently lapsed sessions.
    pub async fn delete_expired_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
