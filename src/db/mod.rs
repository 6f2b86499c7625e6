mod token;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use token::{RotationToken, RotationTokenStore, TokenState};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Timestamps are Unix seconds. token_hash is the SHA-256 digest of the
                // opaque value handed to the client.
                "CREATE TABLE rotation_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id TEXT NOT NULL,
                    token_hash TEXT UNIQUE NOT NULL,
                    display_name TEXT NOT NULL DEFAULT '',
                    must_change_password INTEGER NOT NULL DEFAULT 0,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    used INTEGER NOT NULL DEFAULT 0,
                    used_at INTEGER,
                    revoked_at INTEGER
                )",
                "CREATE INDEX idx_rotation_tokens_token_hash ON rotation_tokens(token_hash)",
                "CREATE INDEX idx_rotation_tokens_owner_id ON rotation_tokens(owner_id)",
                "CREATE INDEX idx_rotation_tokens_expires_at ON rotation_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the rotation token store.
    pub fn tokens(&self) -> RotationTokenStore {
        RotationTokenStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);

        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_token_hash_is_unique() {
        let db = Database::open(":memory:").await.unwrap();
        let insert = "INSERT INTO rotation_tokens (owner_id, token_hash, issued_at, expires_at) VALUES ('o', 'h', 0, 10)";

        sqlx::query(insert).execute(db.pool()).await.unwrap();
        let result = sqlx::query(insert).execute(db.pool()).await;

        assert!(result.is_err());
    }
}
