//! SQLite-backed session store

use super::ttl_duration;
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::str::FromStr;
use tracing::{debug, info};
use warden_core::{store_error, Session, SessionStore, WardenResult};

/// Session store persisting JSON payloads in an `identity_sessions` table
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Connect to `database_url` and create the table if needed
    pub async fn connect(database_url: &str) -> WardenResult<Self> {
        info!("Connecting session store to {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| store_error!("Invalid database URL", "sqlite_store", e))?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| store_error!("Failed to connect to database", "sqlite_store", e))?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool
    pub async fn from_pool(pool: SqlitePool) -> WardenResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_sessions (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_identity_sessions_expires_at
                ON identity_sessions(expires_at);
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| store_error!("Failed to create sessions table", "sqlite_store", e))?;

        Ok(Self { pool })
    }

    /// Delete rows whose TTL has elapsed
    pub async fn purge_expired(&self) -> WardenResult<u64> {
        let result = sqlx::query(
            "DELETE FROM identity_sessions WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error!("Failed to purge sessions", "sqlite_store", e))?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn deadline_ms(ttl_seconds: u64) -> Option<i64> {
    ttl_duration(ttl_seconds).map(|ttl| now_ms().saturating_add(ttl.as_millis() as i64))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn set(
        &self,
        key: &str,
        session: Option<&Session>,
        ttl_seconds: u64,
    ) -> WardenResult<()> {
        let deadline = deadline_ms(ttl_seconds);

        match session {
            Some(session) => {
                let mut session = session.clone();
                session.user = session.user.compacted();
                let payload = serde_json::to_string(&session)?;

                sqlx::query(
                    r#"
                    INSERT INTO identity_sessions (key, payload, expires_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(key) DO UPDATE SET
                        payload = excluded.payload,
                        expires_at = COALESCE(excluded.expires_at, identity_sessions.expires_at)
                    "#,
                )
                .bind(key)
                .bind(payload)
                .bind(deadline)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error!("Failed to save session", "sqlite_store", e))?;
            }
            None => {
                if let Some(deadline) = deadline {
                    sqlx::query("UPDATE identity_sessions SET expires_at = ? WHERE key = ?")
                        .bind(deadline)
                        .bind(key)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| {
                            store_error!("Failed to refresh session TTL", "sqlite_store", e)
                        })?;
                }
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> WardenResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT payload FROM identity_sessions \
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error!("Failed to load session", "sqlite_store", e))?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> WardenResult<()> {
        sqlx::query("DELETE FROM identity_sessions WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error!("Failed to delete session", "sqlite_store", e))?;
        Ok(())
    }
}
