use std::collections::HashMap;

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Classification, CommitCounts, ParsedEntry, StoreError, StoredEntry};

/// Maximum number of entries to return from a single query (OOM protection)
const MAX_ENTRIES: i64 = 2000;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Fetch the guid → fingerprint map for one source.
    ///
    /// The deduplicator classifies a whole source batch against this map in
    /// memory, which is equivalent to looking each key up individually but
    /// costs one query instead of N.
    pub async fn fingerprints_for_source(
        &self,
        source_id: i64,
    ) -> Result<HashMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT guid, fingerprint FROM entries WHERE source_id = ?")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    /// Commit one source's classified entries in a single transaction.
    ///
    /// `New` entries are inserted; `Updated` entries overwrite their stored
    /// metadata and content while preserving `first_seen` and bumping
    /// `revision`; `Unchanged` entries are counted but never written. The
    /// transaction is all-or-nothing: a failure anywhere rolls the whole
    /// batch back, so a crash mid-commit cannot leave partial state for
    /// this source.
    ///
    /// Insert batch size of 50 stays well under SQLite's 999 parameter
    /// limit (8 columns * 50 = 400).
    ///
    /// # Errors
    ///
    /// [`StoreError`] on constraint violation (e.g. an entry classified
    /// `New` whose key already exists) or connectivity loss. The caller
    /// reports this for the one source only.
    pub async fn commit_entries(
        &self,
        source_id: i64,
        classified: &[(ParsedEntry, Classification)],
    ) -> Result<CommitCounts, StoreError> {
        let mut counts = CommitCounts::default();
        for (_, classification) in classified {
            match classification {
                Classification::New => counts.new += 1,
                Classification::Updated => counts.updated += 1,
                Classification::Unchanged => counts.unchanged += 1,
            }
        }

        if counts.new == 0 && counts.updated == 0 {
            return Ok(counts);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        const BATCH_SIZE: usize = 50;
        let new_entries: Vec<&ParsedEntry> = classified
            .iter()
            .filter(|(_, c)| *c == Classification::New)
            .map(|(e, _)| e)
            .collect();

        for chunk in new_entries.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO entries (source_id, guid, title, url, published, content, \
                 fingerprint, first_seen, last_seen) ",
            );

            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(source_id)
                    .push_bind(&entry.guid)
                    .push_bind(&entry.title)
                    .push_bind(&entry.url)
                    .push_bind(entry.published)
                    .push_bind(&entry.content)
                    .push_bind(&entry.fingerprint)
                    .push_bind(now)
                    .push_bind(now);
            });

            builder.build().execute(&mut *tx).await?;
        }

        // Revisions: overwrite content, keep first_seen, bump the counter
        for (entry, _) in classified
            .iter()
            .filter(|(_, c)| *c == Classification::Updated)
        {
            sqlx::query(
                r#"
                UPDATE entries SET
                    title = ?, url = ?, published = ?, content = ?,
                    fingerprint = ?, last_seen = ?, revision = revision + 1
                WHERE source_id = ? AND guid = ?
            "#,
            )
            .bind(&entry.title)
            .bind(&entry.url)
            .bind(entry.published)
            .bind(&entry.content)
            .bind(&entry.fingerprint)
            .bind(now)
            .bind(source_id)
            .bind(&entry.guid)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(counts)
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Get stored entries for one source, most recent first.
    pub async fn entries_for_source(
        &self,
        source_id: i64,
    ) -> Result<Vec<StoredEntry>, StoreError> {
        let entries = sqlx::query_as::<_, StoredEntry>(
            r#"
            SELECT id, source_id, guid, title, url, published, content,
                   fingerprint, first_seen, last_seen, revision
            FROM entries
            WHERE source_id = ?
            ORDER BY published DESC, first_seen DESC
            LIMIT ?
        "#,
        )
        .bind(source_id)
        .bind(MAX_ENTRIES)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Get one entry by its natural key.
    pub async fn entry_by_key(
        &self,
        source_id: i64,
        guid: &str,
    ) -> Result<Option<StoredEntry>, StoreError> {
        let entry = sqlx::query_as::<_, StoredEntry>(
            r#"
            SELECT id, source_id, guid, title, url, published, content,
                   fingerprint, first_seen, last_seen, revision
            FROM entries
            WHERE source_id = ? AND guid = ?
        "#,
        )
        .bind(source_id)
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Total number of stored entries across all sources.
    pub async fn count_entries(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
