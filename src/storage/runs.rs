use super::schema::Database;
use super::types::{RunRecord, StoreError, StoredRun};

impl Database {
    // ========================================================================
    // Run Audit Operations
    // ========================================================================

    /// Persist one ingestion run's audit record, returning its id.
    pub async fn record_run(&self, record: &RunRecord) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ingestion_runs
                (started_at, finished_at, sources_total, sources_failed,
                 new_entries, updated_entries, unchanged_entries, outcomes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.sources_total)
        .bind(record.sources_failed)
        .bind(record.new_entries)
        .bind(record.updated_entries)
        .bind(record.unchanged_entries)
        .bind(&record.outcomes_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent run record, if any.
    pub async fn latest_run(&self) -> Result<Option<StoredRun>, StoreError> {
        let run = sqlx::query_as::<_, StoredRun>(
            r#"
            SELECT id, started_at, finished_at, sources_total, sources_failed,
                   new_entries, updated_entries, unchanged_entries,
                   outcomes AS outcomes_json
            FROM ingestion_runs
            ORDER BY started_at DESC, id DESC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }
}
