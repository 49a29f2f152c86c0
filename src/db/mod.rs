mod refresh_token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use refresh_token::{DeviceMeta, RefreshToken, RefreshTokenStore};
pub use user::{User, UserRole, UserStore};

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

        // An in-memory database exists per connection; the pool must not
        // open a second one.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
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
                // Users table. Timestamps are unix seconds set at the call
                // site; email is unique case-insensitively.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    full_name TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'CUSTOMER',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    email_verified INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_users_email ON users(email)",
                // Refresh token ledger. Only the SHA-256 hex digest of the
                // raw secret is stored. A rotated row has both revoked_at and
                // replaced_by_token_id set; a logout-revoked row has only
                // revoked_at.
                "CREATE TABLE refresh_tokens (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token_hash TEXT UNIQUE NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    revoked_at INTEGER,
                    last_used_at INTEGER,
                    replaced_by_token_id TEXT,
                    ip TEXT,
                    user_agent TEXT,
                    device_name TEXT
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn refresh_tokens(&self) -> RefreshTokenStore {
        RefreshTokenStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a new transaction.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create("a@x.com", "hash", "A", UserRole::Customer, true, true, 100)
            .await
            .unwrap();

        let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.full_name, "A");
        assert_eq!(user.role, UserRole::Customer);
        assert!(user.is_active);
        assert!(user.email_verified);
        assert_eq!(user.created_at, 100);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create("a@x.com", "hash", "A", UserRole::Customer, true, true, 100)
            .await
            .unwrap();
        let result = db
            .users()
            .create("a@x.com", "hash2", "A2", UserRole::Customer, true, true, 101)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create("a@x.com", "hash", "A", UserRole::Customer, true, true, 100)
            .await
            .unwrap();
        let result = db
            .users()
            .create("A@X.COM", "hash2", "A2", UserRole::Customer, true, true, 101)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_count() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.users().count().await.unwrap(), 0);

        db.users()
            .create("a@x.com", "hash", "A", UserRole::Admin, true, true, 100)
            .await
            .unwrap();
        assert_eq!(db.users().count().await.unwrap(), 1);
    }
}
