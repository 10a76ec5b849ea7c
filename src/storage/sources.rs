use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Source, SourceRow, StoreError};
use crate::config::SourceConfig;

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    /// Sync configured sources into the database.
    ///
    /// Batch INSERT in chunks of 100 keeps large source lists to a handful
    /// of statements. Existing rows keep their id, last_fetched, and error;
    /// url and country are refreshed from configuration.
    pub async fn sync_sources(&self, sources: &[SourceConfig]) -> Result<(), StoreError> {
        if sources.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        for chunk in sources.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO sources (name, url, country) ");

            builder.push_values(chunk, |mut b, source| {
                b.push_bind(&source.name)
                    .push_bind(&source.url)
                    .push_bind(&source.country);
            });

            builder.push(
                " ON CONFLICT(name) DO UPDATE SET url = excluded.url, country = excluded.country",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get all sources in insertion order.
    pub async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            r#"
                SELECT id, name, url, country, last_fetched, error
                FROM sources
                ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let sources = rows
            .into_iter()
            .map(|(id, name, url, country, last_fetched, error)| Source {
                id,
                name,
                url,
                country,
                last_fetched,
                error,
            })
            .collect();

        Ok(sources)
    }

    /// Look up one source by name.
    pub async fn get_source(&self, name: &str) -> Result<Option<Source>, StoreError> {
        let row: Option<SourceRow> = sqlx::query_as(
            r#"
                SELECT id, name, url, country, last_fetched, error
                FROM sources
                WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, url, country, last_fetched, error)| Source {
            id,
            name,
            url,
            country,
            last_fetched,
            error,
        }))
    }

    /// Batch update source error statuses in a single UPDATE statement.
    ///
    /// Uses one bulk UPDATE with a CASE expression instead of N individual
    /// UPDATE calls, so a run over many sources settles its statuses in one
    /// round-trip.
    ///
    /// # Arguments
    ///
    /// * `updates` - Slice of (source_id, error_message) tuples. `None` clears the error.
    pub async fn batch_set_source_errors(
        &self,
        updates: &[(i64, Option<String>)],
    ) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }

        // Build: UPDATE sources SET error = CASE id
        //            WHEN 1 THEN 'error1'
        //            WHEN 2 THEN NULL
        //        END
        //        WHERE id IN (1, 2)
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE sources SET error = CASE id ");

        for (source_id, error) in updates {
            builder.push("WHEN ");
            builder.push_bind(*source_id);
            builder.push(" THEN ");
            builder.push_bind(error.as_deref());
            builder.push(" ");
        }

        builder.push("END WHERE id IN (");
        let mut separated = builder.separated(", ");
        for (source_id, _) in updates {
            separated.push_bind(*source_id);
        }
        separated.push_unseparated(")");

        let mut tx = self.pool.begin().await?;
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Stamp last_fetched for the sources that completed successfully.
    pub async fn mark_sources_fetched(&self, source_ids: &[i64]) -> Result<(), StoreError> {
        if source_ids.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE sources SET last_fetched = ");
        builder.push_bind(now);
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in source_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
