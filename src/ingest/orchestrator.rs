use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use super::dedup;
use super::fetcher::{self, FetchError};
use super::filter::EntryFilter;
use super::parser::{self, ParseError, ParseOutcome};
use crate::config::{Config, SourceConfig};
use crate::registry::SourceRegistry;
use crate::storage::{Database, RunRecord, StoreError};

/// Per-unit error: whatever stage a source-unit died in, captured at the
/// unit boundary. Never propagates to sibling units.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Run deadline exceeded")]
    RunTimeout,
    #[error("Source '{0}' missing from the store after sync")]
    UnknownSource(String),
    #[error("Invalid source URL: {0}")]
    InvalidUrl(url::ParseError),
}

/// Terminal status of one source-unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Committed cleanly
    Ok,
    /// Committed, but some entries were dropped during normalization
    Partial,
    /// Died at some stage; no entries from this run were committed
    Failed,
}

/// Outcome of one source-unit within a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    #[serde(skip)]
    pub source_id: i64,
    pub status: SourceStatus,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Entries dropped by the keyword filter
    pub filtered: usize,
    /// Entries dropped during normalization (no key, in-document dupes)
    pub skipped: usize,
    pub error: Option<String>,
}

/// Summary of one full ingestion run across all registered sources.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: i64,
    pub finished_at: i64,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunSummary {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == SourceStatus::Failed)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn total_new(&self) -> usize {
        self.outcomes.iter().map(|o| o.new).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.outcomes.iter().map(|o| o.updated).sum()
    }

    pub fn total_unchanged(&self) -> usize {
        self.outcomes.iter().map(|o| o.unchanged).sum()
    }
}

struct UnitCounts {
    new: usize,
    updated: usize,
    unchanged: usize,
    filtered: usize,
    skipped: usize,
}

/// Drive one full ingestion run across all registered sources.
///
/// Each source becomes an independent unit of work
/// (fetch→parse→filter→dedupe→commit) and units run concurrently up to the
/// configured limit, so neither the network nor the database is swamped. A
/// unit failing at any stage is recorded in its outcome and never disturbs
/// its siblings. The run-level deadline cancels units still in flight;
/// whatever they had already committed stays committed.
///
/// After all units settle: per-source error columns are batch-updated,
/// `last_fetched` is stamped for the sources that completed, and the run
/// is appended to the audit table.
///
/// There are no whole-run retries here — a failed source simply shows up
/// as `Failed` in the summary, and rerunning is the scheduler's call.
///
/// # Errors
///
/// Only store-level failures that prevent the run from starting or being
/// recorded (source sync, audit insert) are returned as `Err`; per-source
/// failures live in the summary.
pub async fn run_ingestion(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    registry: &SourceRegistry,
) -> Result<RunSummary, StoreError> {
    let started_at = chrono::Utc::now().timestamp();

    // Mirror the registry into the store so entries have stable source ids
    db.sync_sources(registry.list()).await?;
    let id_by_name: std::collections::HashMap<String, i64> = db
        .list_sources()
        .await?
        .into_iter()
        .map(|s| (s.name, s.id))
        .collect();

    let filter = EntryFilter::new(&config.filter);
    let deadline = Instant::now() + config.run_timeout();
    let total = registry.len();

    tracing::info!(
        sources = total,
        concurrency = config.concurrency,
        "Starting ingestion run"
    );

    let outcomes: Vec<SourceOutcome> = stream::iter(registry.list().iter().cloned())
        .map(|source| {
            let db = db.clone();
            let client = client.clone();
            let filter = filter.clone();
            let source_id = id_by_name.get(&source.name).copied();

            async move {
                let name = source.name.clone();
                let Some(source_id) = source_id else {
                    return failed_outcome(&name, 0, IngestError::UnknownSource(name.clone()));
                };

                let unit = run_source_unit(&db, &client, &filter, config, &source, source_id);
                match tokio::time::timeout_at(deadline, unit).await {
                    Ok(Ok(counts)) => {
                        let status = if counts.skipped > 0 {
                            SourceStatus::Partial
                        } else {
                            SourceStatus::Ok
                        };
                        tracing::info!(
                            source = %name,
                            new = counts.new,
                            updated = counts.updated,
                            unchanged = counts.unchanged,
                            filtered = counts.filtered,
                            skipped = counts.skipped,
                            "Source ingested"
                        );
                        SourceOutcome {
                            source: name,
                            source_id,
                            status,
                            new: counts.new,
                            updated: counts.updated,
                            unchanged: counts.unchanged,
                            filtered: counts.filtered,
                            skipped: counts.skipped,
                            error: None,
                        }
                    }
                    Ok(Err(e)) => failed_outcome(&name, source_id, e),
                    Err(_) => failed_outcome(&name, source_id, IngestError::RunTimeout),
                }
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    // Settle per-source status columns in one round-trip each
    let error_updates: Vec<(i64, Option<String>)> = outcomes
        .iter()
        .filter(|o| o.source_id != 0)
        .map(|o| (o.source_id, o.error.clone()))
        .collect();
    db.batch_set_source_errors(&error_updates).await?;

    let fetched_ids: Vec<i64> = outcomes
        .iter()
        .filter(|o| o.status != SourceStatus::Failed)
        .map(|o| o.source_id)
        .collect();
    db.mark_sources_fetched(&fetched_ids).await?;

    let finished_at = chrono::Utc::now().timestamp();
    let summary = RunSummary {
        started_at,
        finished_at,
        outcomes,
    };

    let outcomes_json =
        serde_json::to_string(&summary.outcomes).unwrap_or_else(|_| "[]".to_string());
    db.record_run(&RunRecord {
        started_at,
        finished_at,
        sources_total: total as i64,
        sources_failed: summary.failed_count() as i64,
        new_entries: summary.total_new() as i64,
        updated_entries: summary.total_updated() as i64,
        unchanged_entries: summary.total_unchanged() as i64,
        outcomes_json,
    })
    .await?;

    tracing::info!(
        new = summary.total_new(),
        updated = summary.total_updated(),
        unchanged = summary.total_unchanged(),
        failed = summary.failed_count(),
        "Ingestion run finished"
    );

    Ok(summary)
}

/// One source's fetch→parse→filter→dedupe→commit pipeline.
///
/// Stage order is strict and sequential within the unit; concurrency only
/// exists between units.
async fn run_source_unit(
    db: &Database,
    client: &reqwest::Client,
    filter: &EntryFilter,
    config: &Config,
    source: &SourceConfig,
    source_id: i64,
) -> Result<UnitCounts, IngestError> {
    tracing::debug!(source = %source.name, "Fetching");
    let timeout = config.fetch_timeout_for(source);
    let doc = fetcher::fetch(client, source, timeout, &config.retry).await?;

    tracing::debug!(source = %source.name, bytes = doc.bytes.len(), "Parsing");
    let base_url = Url::parse(&source.url).map_err(IngestError::InvalidUrl)?;
    let ParseOutcome { entries, skipped } =
        parser::parse_document(&doc, &base_url, config.max_entries_per_source)?;

    let (kept, filtered) = filter.apply(entries, source.keep_all);

    tracing::debug!(source = %source.name, entries = kept.len(), "Deduplicating");
    let stored = db.fingerprints_for_source(source_id).await?;
    let classified = dedup::classify(kept, &stored);

    tracing::debug!(source = %source.name, "Committing");
    let counts = db.commit_entries(source_id, &classified).await?;

    Ok(UnitCounts {
        new: counts.new,
        updated: counts.updated,
        unchanged: counts.unchanged,
        filtered,
        skipped,
    })
}

fn failed_outcome(name: &str, source_id: i64, error: IngestError) -> SourceOutcome {
    // Store failures risk silent data loss, so they log at error level;
    // everything else is routine feed weather.
    match &error {
        IngestError::Store(e) => {
            tracing::error!(source = %name, error = %e, "Commit failed for source");
        }
        e => {
            tracing::warn!(source = %name, error = %e, "Source failed");
        }
    }

    SourceOutcome {
        source: name.to_string(),
        source_id,
        status: SourceStatus::Failed,
        new: 0,
        updated: 0,
        unchanged: 0,
        filtered: 0,
        skipped: 0,
        error: Some(error.to_string()),
    }
}
