//! Rotation token storage.
//!
//! Only rotation tokens are stored; credentials are stateless. Rows hold the
//! digest of the opaque value, never the value itself. Rows are never deleted
//! here except by the retention cleanup.

use sqlx::sqlite::SqlitePool;

use crate::jwt::SessionClaims;

/// Lifecycle state of a rotation token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Unused, unrevoked and unexpired
    Active,
    /// Already exchanged for a new pair
    Used,
    /// Revoked explicitly or as part of a family revocation
    Revoked,
    /// Past its expiry
    Expired,
}

/// A rotation token record.
#[derive(Debug, Clone)]
pub struct RotationToken {
    pub id: i64,
    pub owner_id: String,
    pub token_hash: String,
    pub display_name: String,
    pub must_change_password: bool,
    pub issued_at: i64,
    pub expires_at: i64,
    pub used: bool,
    pub used_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

impl RotationToken {
    /// Classify the token. Expiry wins over revocation, and revocation over
    /// use: a consumed token whose family was revoked afterwards is dead, not a
    /// replay signal.
    pub fn state(&self, now: i64) -> TokenState {
        if self.expires_at < now {
            TokenState::Expired
        } else if self.revoked_at.is_some() {
            TokenState::Revoked
        } else if self.used {
            TokenState::Used
        } else {
            TokenState::Active
        }
    }

    /// Session claims to carry into credentials minted from this token.
    pub fn claims(&self) -> SessionClaims {
        SessionClaims {
            name: self.display_name.clone(),
            must_change_password: self.must_change_password,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RotationTokenRow {
    id: i64,
    owner_id: String,
    token_hash: String,
    display_name: String,
    must_change_password: i32,
    issued_at: i64,
    expires_at: i64,
    used: i32,
    used_at: Option<i64>,
    revoked_at: Option<i64>,
}

impl From<RotationTokenRow> for RotationToken {
    fn from(row: RotationTokenRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            token_hash: row.token_hash,
            display_name: row.display_name,
            must_change_password: row.must_change_password != 0,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            used: row.used != 0,
            used_at: row.used_at,
            revoked_at: row.revoked_at,
        }
    }
}

/// Static SELECT over every column, followed by the given clause.
macro_rules! select_tokens {
    ($clause:literal) => {
        concat!(
            "SELECT id, owner_id, token_hash, display_name, must_change_password, issued_at, expires_at, used, used_at, revoked_at FROM rotation_tokens ",
            $clause
        )
    };
}

/// Store for managing rotation tokens.
#[derive(Clone)]
pub struct RotationTokenStore {
    pool: SqlitePool,
}

impl RotationTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new, unused rotation token record. Returns the row ID.
    pub async fn create(
        &self,
        owner_id: &str,
        token_hash: &str,
        claims: &SessionClaims,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO rotation_tokens (owner_id, token_hash, display_name, must_change_password, issued_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(token_hash)
        .bind(&claims.name)
        .bind(claims.must_change_password)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a token by the digest of its opaque value.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RotationToken>, sqlx::Error> {
        let row: Option<RotationTokenRow> =
            sqlx::query_as(select_tokens!("WHERE token_hash = ?"))
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    /// Get a token by its row ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<RotationToken>, sqlx::Error> {
        let row: Option<RotationTokenRow> =
            sqlx::query_as(select_tokens!("WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    /// Atomically transition an active token to used.
    ///
    /// Returns true only for the single caller whose update flipped the flag.
    /// Every other caller gets false and must re-read the row.
    pub async fn mark_used(&self, id: i64, now: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rotation_tokens SET used = 1, used_at = ? WHERE id = ? AND used = 0 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Revoke a single token by row ID. Returns false if it was already revoked or missing.
    pub async fn revoke(&self, id: i64, now: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rotation_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a single token by the digest of its opaque value.
    pub async fn revoke_by_hash(&self, token_hash: &str, now: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rotation_tokens SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every token of an owner (the whole session family).
    pub async fn revoke_family(&self, owner_id: &str, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rotation_tokens SET revoked_at = ? WHERE owner_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List the owner's active tokens, newest first.
    pub async fn list_active_by_owner(
        &self,
        owner_id: &str,
        now: i64,
    ) -> Result<Vec<RotationToken>, sqlx::Error> {
        let rows: Vec<RotationTokenRow> = sqlx::query_as(select_tokens!(
            "WHERE owner_id = ? AND used = 0 AND revoked_at IS NULL AND expires_at >= ? ORDER BY issued_at DESC, id DESC"
        ))
        .bind(owner_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// List every token ever issued to the owner, oldest first.
    pub async fn list_family(&self, owner_id: &str) -> Result<Vec<RotationToken>, sqlx::Error> {
        let rows: Vec<RotationTokenRow> =
            sqlx::query_as(select_tokens!("WHERE owner_id = ? ORDER BY id ASC"))
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete tokens that expired before `cutoff`.
    pub async fn delete_expired_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rotation_tokens WHERE expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
