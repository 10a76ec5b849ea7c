use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-friendly messages.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process has the database locked
    #[error("The database is locked by another process. Please retry once it has finished.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::Locked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Row type for source queries
pub(crate) type SourceRow = (
    i64,
    String,
    String,
    String,
    Option<i64>,
    Option<String>,
);

/// A feed source as stored in the database.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub country: String,
    pub last_fetched: Option<i64>,
    pub error: Option<String>,
}

/// A normalized feed entry, ready for classification and commit.
///
/// Produced by the parser; the natural key is (source id, guid). The
/// fingerprint is a hash of the normalized title and content, so it is
/// stable under whitespace-only feed regeneration.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub content: Option<String>,
    pub fingerprint: String,
}

/// How an incoming entry relates to stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Natural key absent from the store
    New,
    /// Key present, fingerprint matches
    Unchanged,
    /// Key present, fingerprint differs (source republished with edits)
    Updated,
}

/// Per-source write counts returned by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitCounts {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// An entry row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEntry {
    pub id: i64,
    pub source_id: i64,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub content: Option<String>,
    pub fingerprint: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub revision: i64,
}

/// One ingestion run's audit record, ready to persist.
///
/// `outcomes_json` carries the per-source outcome detail serialized by the
/// orchestrator; the scalar columns make the common "how did the last run
/// go" query cheap.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: i64,
    pub finished_at: i64,
    pub sources_total: i64,
    pub sources_failed: i64,
    pub new_entries: i64,
    pub updated_entries: i64,
    pub unchanged_entries: i64,
    pub outcomes_json: String,
}

/// An audit row read back from the store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRun {
    pub id: i64,
    pub started_at: i64,
    pub finished_at: i64,
    pub sources_total: i64,
    pub sources_failed: i64,
    pub new_entries: i64,
    pub updated_entries: i64,
    pub unchanged_entries: i64,
    pub outcomes_json: String,
}
