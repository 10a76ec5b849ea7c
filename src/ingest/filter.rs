use crate::config::FilterConfig;
use crate::storage::ParsedEntry;

/// Keyword gate applied between parse and dedupe.
///
/// General-interest sources only contribute entries matching one of the
/// configured keywords; sources marked `keep_all` bypass the gate entirely.
/// With no keywords configured the filter keeps everything.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    keywords: Vec<String>,
}

impl EntryFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            keywords: config
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Whether an entry passes the gate.
    pub fn matches(&self, entry: &ParsedEntry, keep_all: bool) -> bool {
        if keep_all || self.keywords.is_empty() {
            return true;
        }

        let haystack = format!(
            "{} {}",
            entry.title,
            entry.content.as_deref().unwrap_or("")
        )
        .to_lowercase();

        self.keywords.iter().any(|kw| haystack.contains(kw))
    }

    /// Partition a source's entries into kept and a filtered-out count.
    pub fn apply(&self, entries: Vec<ParsedEntry>, keep_all: bool) -> (Vec<ParsedEntry>, usize) {
        let total = entries.len();
        let kept: Vec<ParsedEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e, keep_all))
            .collect();
        let filtered = total - kept.len();
        (kept, filtered)
    }
}
