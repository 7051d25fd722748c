use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open the seen-state store and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// store locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Restrict the store to the owning user before the pool touches it.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set ledger file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    // Pre-create with mode 0600 so there is no window where
                    // the file exists with default umask permissions.
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite reports the error at connect_with.
                }
            }
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Handles transient contention between
        // overlapping refresh cycles. Using pragma() ensures every pooled
        // connection inherits the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; the ledger sees one writer plus a handful
        // of concurrent partition reads, so a small pool is plenty.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            // Migration errors could also be lock-related
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Open the store at `path`, degrading to an ephemeral in-memory
    /// store if the file is unreadable.
    ///
    /// A corrupt or unopenable ledger must not stop a refresh; the cost
    /// of starting empty is only that everything appears new once.
    /// `InstanceLocked` stays fatal: another process owns the store and
    /// falling back would fork the seen state.
    pub async fn open_or_ephemeral(path: &str) -> Result<Self, DatabaseError> {
        match Self::open(path).await {
            Ok(db) => Ok(db),
            Err(DatabaseError::InstanceLocked) => Err(DatabaseError::InstanceLocked),
            Err(e) => {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "Failed to open seen ledger, continuing with an empty in-memory store"
                );
                Self::open(":memory:").await
            }
        }
    }

    /// Run migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS` for idempotency, so re-running on
    /// an existing store is a no-op. If any step fails the transaction rolls
    /// back and the store stays in its previous consistent state.
    async fn migrate(&self) -> Result<()> {
        // Enable foreign keys (must be outside transaction, per-connection setting)
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        // One row per source: the strategy tag plus the watermark pair.
        // Sources on the identifier-set strategy leave the watermark
        // columns NULL and keep their identifiers in seen_ids.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_sources (
                source TEXT PRIMARY KEY,
                strategy TEXT NOT NULL,
                last_seen_ts INTEGER,
                last_seen_id TEXT,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Bounded per-source identifier set; seq preserves recency order
        // (higher seq = more recently acknowledged).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_ids (
                source TEXT NOT NULL REFERENCES seen_sources(source) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                native_id TEXT NOT NULL,
                PRIMARY KEY (source, native_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_seen_ids_source_seq ON seen_ids(source, seq)")
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
    async fn test_corrupt_store_degrades_to_ephemeral() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.db");
        std::fs::write(&path, b"this is not a sqlite database").unwrap();

        // Plain open fails on the garbage file.
        let err = Database::open(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Migration(_)));

        // The fallback path yields a working empty store instead.
        let db = Database::open_or_ephemeral(path.to_str().unwrap())
            .await
            .unwrap();
        let entries = db.load_ledger().await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_open_or_ephemeral_uses_healthy_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.db");

        let db = Database::open_or_ephemeral(path.to_str().unwrap())
            .await
            .unwrap();
        db.replace_source(&crate::storage::PersistedSource {
            source: "reddit".to_string(),
            strategy: "ids".to_string(),
            last_seen_ts: None,
            last_seen_id: None,
            updated_at_ms: 1,
            ids: vec!["a".to_string()],
        })
        .await
        .unwrap();
        drop(db);

        // State written through the fallback constructor is durable.
        let reopened = Database::open_or_ephemeral(path.to_str().unwrap())
            .await
            .unwrap();
        let entries = reopened.load_ledger().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ids, vec!["a"]);
    }
}
