mod entries;
mod runs;
mod schema;
mod sources;
mod types;

pub use schema::Database;
pub use types::{
    Classification, CommitCounts, ParsedEntry, RunRecord, Source, StoreError, StoredEntry,
    StoredRun,
};
