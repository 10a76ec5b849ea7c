use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process has the database
    /// locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `StoreError::Migration` if the schema migration fails.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. This absorbs transient contention from
        // concurrent per-source commits. Using pragma() ensures every
        // connection in the pool inherits the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers peak concurrent
        // readers (fingerprint lookups) alongside the serialized commits.
        // An in-memory database exists per-connection, so it must be pinned
        // to a single connection or the pool would fragment it.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            // Migration errors could also be lock-related
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                StoreError::Locked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction so a failure
    /// mid-migration (disk full, power loss) rolls back to the previous
    /// consistent state. Every statement uses `IF NOT EXISTS`, so running
    /// migrations against an already-initialized database is a no-op —
    /// `tributary setup` can be invoked any number of times.
    async fn migrate(&self) -> Result<()> {
        // Enable foreign keys (must be outside transaction, per-connection setting)
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        // Feed sources, mirrored from configuration at the start of a run
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                url TEXT NOT NULL,
                country TEXT NOT NULL DEFAULT '',
                last_fetched INTEGER,
                error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Ingested entries; (source_id, guid) is the natural key
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                guid TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                published INTEGER,
                content TEXT,
                fingerprint TEXT NOT NULL,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1,
                UNIQUE(source_id, guid)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_published ON entries(published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Audit trail: one row per ingestion run
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_runs (
                id INTEGER PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                sources_total INTEGER NOT NULL,
                sources_failed INTEGER NOT NULL,
                new_entries INTEGER NOT NULL,
                updated_entries INTEGER NOT NULL,
                unchanged_entries INTEGER NOT NULL,
                outcomes TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_runs_started ON ingestion_runs(started_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_schema() {
        let db = Database::open(":memory:").await.unwrap();
        // All tables exist and are queryable
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingestion_runs")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let dir = std::env::temp_dir().join("tributary_schema_test_idempotent");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.db");
        let path_str = path.to_str().unwrap();

        // Opening twice runs migrations twice against the same file
        let db = Database::open(path_str).await.unwrap();
        sqlx::query("INSERT INTO sources (name, url) VALUES ('A', 'https://a.example.com/rss')")
            .execute(&db.pool)
            .await
            .unwrap();
        drop(db);

        let db = Database::open(path_str).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        // Existing data survives the re-run
        assert_eq!(count.0, 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
