use std::collections::HashMap;

use crate::storage::{Classification, ParsedEntry};

/// Classify a source's entries against its stored guid → fingerprint map.
///
/// The map comes from one batched query per source, but classification is
/// a pure per-entry lookup, so the result is identical to evaluating each
/// entry individually:
///
/// - key absent → `New`
/// - key present, fingerprint equal → `Unchanged`
/// - key present, fingerprint differs → `Updated` (republished with edits)
pub fn classify(
    entries: Vec<ParsedEntry>,
    stored: &HashMap<String, String>,
) -> Vec<(ParsedEntry, Classification)> {
    entries
        .into_iter()
        .map(|entry| {
            let classification = match stored.get(&entry.guid) {
                None => Classification::New,
                Some(fp) if *fp == entry.fingerprint => Classification::Unchanged,
                Some(_) => Classification::Updated,
            };
            (entry, classification)
        })
        .collect()
}
