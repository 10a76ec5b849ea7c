use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use super::fetcher::RawDocument;
use crate::storage::ParsedEntry;

/// Errors produced while parsing a raw feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Document could not be parsed as any supported syndication format
    #[error("Feed parse error: {0}")]
    Malformed(#[from] feed_rs::parser::ParseFeedError),
}

/// Result of parsing one feed document.
pub struct ParseOutcome {
    pub entries: Vec<ParsedEntry>,
    /// Entries dropped during normalization: no usable natural key, or a
    /// duplicate guid within the same document (first occurrence wins).
    pub skipped: usize,
}

/// Parse a raw feed document into normalized entries.
///
/// feed-rs handles the dialect zoo (RSS 0.9x/1.0/2.0, Atom, JSON Feed).
/// Normalization applied to every entry:
///
/// - HTML tags stripped from title and content
/// - whitespace trimmed and runs collapsed to single spaces
/// - relative entry links resolved against the feed's base URL
/// - fingerprint computed from the normalized (not raw) text, so
///   whitespace-only feed regeneration does not register as a change
///
/// Entries with neither an id nor a resolvable link are skipped — there is
/// no natural key to deduplicate them by. At most `max_entries` entries are
/// taken from the document.
///
/// # Errors
///
/// [`ParseError::Malformed`] if the document is not a parseable feed. The
/// caller records this for the one source; it never aborts the run.
pub fn parse_document(
    doc: &RawDocument,
    base_url: &Url,
    max_entries: usize,
) -> Result<ParseOutcome, ParseError> {
    let feed = feed_rs::parser::parse(doc.bytes.as_slice())?;

    let mut entries = Vec::new();
    let mut skipped = 0;
    let mut seen_guids = std::collections::HashSet::new();

    for entry in feed.entries.into_iter().take(max_entries) {
        let url = entry
            .links
            .first()
            .and_then(|l| resolve_link(base_url, &l.href));
        let has_id = !entry.id.trim().is_empty();
        if !has_id && url.is_none() {
            skipped += 1;
            continue;
        }

        let title = normalize_text(
            &entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string()),
        );
        let title = if title.is_empty() {
            "Untitled".to_string()
        } else {
            title
        };

        let content = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|raw| normalize_text(&raw))
            .filter(|s| !s.is_empty());

        let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());

        let existing_id = if has_id {
            Some(entry.id.as_str())
        } else {
            None
        };
        let guid = generate_guid(existing_id, url.as_deref(), &title, published);

        // Feeds occasionally repeat an item; keep the first occurrence so
        // batched classification stays equivalent to one-at-a-time.
        if !seen_guids.insert(guid.clone()) {
            skipped += 1;
            continue;
        }

        let fingerprint = fingerprint(&title, content.as_deref().unwrap_or(""));

        entries.push(ParsedEntry {
            guid,
            title,
            url,
            published,
            content,
            fingerprint,
        });
    }

    Ok(ParseOutcome { entries, skipped })
}

/// Strip HTML tags, keeping text content.
///
/// Feeds routinely wrap summaries in markup; the store holds plain text.
fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tags act as word boundaries so "<p>a</p><p>b</p>" keeps a gap
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Trim and collapse runs of whitespace to single spaces.
fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full normalization pipeline: strip markup, then collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    collapse_whitespace(&strip_html(input))
}

/// Deterministic content fingerprint over normalized title and content.
pub fn fingerprint(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve an entry link against the feed's base URL.
///
/// Absolute links pass through; relative links are joined; garbage yields
/// `None` rather than a bogus stored URL.
fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.join(href).ok().map(|u| u.to_string())
        }
        Err(_) => None,
    }
}

fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
