//! The ingestion pipeline: fetch, parse, filter, dedupe, commit.
//!
//! One ingestion run walks every registered source through an independent
//! source-unit pipeline:
//!
//! - [`fetcher`] - HTTP retrieval with per-source timeout and bounded retry
//! - [`parser`] - syndication parsing and entry normalization (feed-rs)
//! - [`filter`] - optional keyword gate for general-interest sources
//! - [`dedup`] - New/Unchanged/Updated classification against the store
//! - [`orchestrator`] - bounded-concurrency coordination and run summary

mod dedup;
mod fetcher;
mod filter;
mod orchestrator;
mod parser;

pub use dedup::classify;
pub use fetcher::{fetch, FetchError, RawDocument};
pub use filter::EntryFilter;
pub use orchestrator::{run_ingestion, IngestError, RunSummary, SourceOutcome, SourceStatus};
pub use parser::{parse_document, ParseError, ParseOutcome};
