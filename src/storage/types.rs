use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of decant appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // Check for SQLite lock-related error messages
        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Persisted Ledger Rows
// ============================================================================

/// One source's seen-state as persisted, read back whole at startup.
///
/// `ids` is ordered oldest to newest (ascending `seq`); the watermark
/// columns are populated only for sources on the watermark fallback.
#[derive(Debug, Clone)]
pub struct PersistedSource {
    pub source: String,
    /// `"ids"` or `"watermark"`.
    pub strategy: String,
    pub last_seen_ts: Option<i64>,
    pub last_seen_id: Option<String>,
    /// Milliseconds since epoch of the last acknowledge.
    pub updated_at_ms: i64,
    pub ids: Vec<String>,
}
