//! Feed source registry: the validated, ordered set of endpoints an
//! ingestion run operates on.
//!
//! The registry is built once from [`Config`] before any run starts and is
//! read-only afterwards. Validation failures are fatal — a run against a
//! half-broken source list would silently drop feeds.

use std::collections::HashSet;

use url::Url;

use crate::config::{Config, ConfigError, SourceConfig};

/// Immutable, validated view of the configured feed sources.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    /// Build a registry from configuration, validating every source.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoSources`] if the list is empty
    /// - [`ConfigError::InvalidUrl`] for URLs that do not parse or use a
    ///   scheme other than http/https
    /// - [`ConfigError::DuplicateSource`] if two sources share a name
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        if config.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut seen = HashSet::new();
        for source in &config.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }

            let parsed = Url::parse(&source.url).map_err(|e| ConfigError::InvalidUrl {
                name: source.name.clone(),
                url: source.url.clone(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl {
                    name: source.name.clone(),
                    url: source.url.clone(),
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }

        Ok(Self {
            sources: config.sources.clone(),
        })
    }

    /// All sources, in configuration order.
    pub fn list(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Look up a source by name.
    pub fn get(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(sources: Vec<SourceConfig>) -> Config {
        Config {
            sources,
            ..Config::default()
        }
    }

    fn source(name: &str, url: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            country: String::new(),
            fetch_timeout_secs: None,
            keep_all: false,
        }
    }

    #[test]
    fn test_empty_source_list_rejected() {
        let result = SourceRegistry::from_config(&config_with(vec![]));
        assert!(matches!(result, Err(ConfigError::NoSources)));
    }

    #[test]
    fn test_malformed_url_rejected() {
        let config = config_with(vec![source("Broken", "not a url")]);
        let result = SourceRegistry::from_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let config = config_with(vec![source("File", "file:///etc/passwd")]);
        let result = SourceRegistry::from_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let config = config_with(vec![
            source("Same", "https://a.example.com/rss"),
            source("Same", "https://b.example.com/rss"),
        ]);
        let result = SourceRegistry::from_config(&config);
        match result {
            Err(ConfigError::DuplicateSource(name)) => assert_eq!(name, "Same"),
            other => panic!("Expected DuplicateSource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_list_preserves_config_order() {
        let config = config_with(vec![
            source("Zeta", "https://z.example.com/rss"),
            source("Alpha", "https://a.example.com/rss"),
        ]);
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].name, "Zeta");
        assert_eq!(registry.list()[1].name, "Alpha");
    }

    #[test]
    fn test_get_by_name() {
        let config = config_with(vec![source("Alpha", "https://a.example.com/rss")]);
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert!(registry.get("Alpha").is_some());
        assert!(registry.get("Missing").is_none());
    }
}
