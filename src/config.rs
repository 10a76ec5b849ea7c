//! Configuration file parser for tributary.toml.
//!
//! The config file is required — it carries the feed source list, and an
//! ingestion run without sources is meaningless. Unknown keys are silently
//! ignored by serde (with `deny_unknown_fields` off), though we log a
//! warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors. All of these are fatal: the process must not start
/// a run with a broken source list.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No feed sources configured")]
    NoSources,

    #[error("Source '{name}' has a malformed URL '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("Duplicate source name '{0}'")]
    DuplicateSource(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All scalar fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`. The source
/// list itself is validated later by [`crate::registry::SourceRegistry`],
/// which rejects an empty list.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of source-units processed in parallel.
    pub concurrency: usize,

    /// Deadline for one full ingestion run, in seconds.
    pub run_timeout_secs: u64,

    /// Default per-source fetch timeout, in seconds. Sources may override.
    pub fetch_timeout_secs: u64,

    /// Cap on entries ingested from a single feed document.
    pub max_entries_per_source: usize,

    /// Retry policy for transient fetch failures.
    pub retry: RetryConfig,

    /// Optional keyword filter applied between parse and dedupe.
    pub filter: FilterConfig,

    /// The feed sources to ingest.
    pub sources: Vec<SourceConfig>,
}

/// Bounded retry with exponential backoff: attempt n sleeps
/// `base_backoff_ms * 2^n` before retrying.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

/// Keyword gate configuration. An empty keyword list keeps every entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Case-insensitive substrings matched against title + content.
    pub keywords: Vec<String>,
}

/// One configured feed endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    /// Unique display name; doubles as the source's stable identifier.
    pub name: String,
    pub url: String,
    /// Country label carried through to the store for downstream consumers.
    #[serde(default)]
    pub country: String,
    /// Per-source fetch timeout override, in seconds.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    /// When true, entries from this source bypass the keyword filter.
    #[serde(default)]
    pub keep_all: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            run_timeout_secs: 300,
            fetch_timeout_secs: 30,
            max_entries_per_source: 30,
            retry: RetryConfig::default(),
            filter: FilterConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::Io)` — the source list is required
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid slurping a corrupted or
        // maliciously large config file into memory.
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "concurrency",
                "run_timeout_secs",
                "fetch_timeout_secs",
                "max_entries_per_source",
                "retry",
                "filter",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Effective fetch timeout for one source (override or global default).
    pub fn fetch_timeout_for(&self, source: &SourceConfig) -> Duration {
        Duration::from_secs(source.fetch_timeout_secs.unwrap_or(self.fetch_timeout_secs))
    }

    /// Deadline for one full ingestion run.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir_name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tributary.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.run_timeout_secs, 300);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_entries_per_source, 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_backoff_ms, 500);
        assert!(config.filter.keywords.is_empty());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        let path = Path::new("/tmp/tributary_test_nonexistent_config.toml");
        let result = Config::load(path);
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config(
            "tributary_config_test_partial",
            r#"
concurrency = 4

[[sources]]
name = "Example"
url = "https://example.com/feed.xml"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.fetch_timeout_secs, 30); // default
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "Example");
        assert!(config.sources[0].fetch_timeout_secs.is_none());
        assert!(!config.sources[0].keep_all);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_full_config() {
        let path = write_config(
            "tributary_config_test_full",
            r#"
concurrency = 2
run_timeout_secs = 60
fetch_timeout_secs = 10
max_entries_per_source = 5

[retry]
max_attempts = 5
base_backoff_ms = 100

[filter]
keywords = ["rust", "async"]

[[sources]]
name = "Fast Feed"
url = "https://fast.example.com/rss"
country = "US"
fetch_timeout_secs = 3

[[sources]]
name = "Keep Everything"
url = "https://keep.example.com/atom"
keep_all = true
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_backoff_ms, 100);
        assert_eq!(config.filter.keywords, vec!["rust", "async"]);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].country, "US");
        assert_eq!(
            config.fetch_timeout_for(&config.sources[0]),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.fetch_timeout_for(&config.sources[1]),
            Duration::from_secs(10)
        );
        assert!(config.sources[1].keep_all);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("tributary_config_test_invalid", "this is not [valid toml");

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "tributary_config_test_unknown",
            r#"
totally_fake_key = "should not fail"

[[sources]]
name = "Example"
url = "https://example.com/feed.xml"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sources.len(), 1);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("tributary_config_test_wrongtype", "concurrency = \"many\"\n");

        let result = Config::load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("tributary_config_test_too_large", &"a".repeat(1_048_577));

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::TooLarge(_))));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
