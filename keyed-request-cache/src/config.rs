use crate::error::Error;
use crate::options::CallOptions;
use chrono::Duration;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::path::Path;

/// Longest accepted `ttl_ms`, one year.
pub const MAX_TTL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Configuration for the request cache
///
/// The defaults keep every entry for the lifetime of the cache: no size bound and
/// no expiry.
#[serde_inline_default]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When disabled, settled entries are fetched again on every resolve.
    /// Concurrent callers are still deduplicated.
    #[serde_inline_default(true)]
    pub enabled: bool,
    /// Upper bound on stored entries
    #[serde(default)]
    pub max_entries: Option<usize>,
    /// How long a settled entry is served before it is fetched again
    #[serde(default)]
    pub ttl_ms: Option<i64>,
    /// Options applied to entries that never had [`CallOptions`] set explicitly
    #[serde(default)]
    pub default_options: CallOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: None,
            ttl_ms: None,
            default_options: CallOptions::default(),
        }
    }
}

impl CacheConfig {
    pub fn new(max_entries: Option<usize>, ttl: Option<Duration>) -> Self {
        Self {
            max_entries,
            ttl_ms: ttl.map(|ttl| ttl.num_milliseconds()),
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.and_then(Duration::try_milliseconds)
    }

    /// Load the configuration from defaults, an optional YAML file and
    /// `REQUEST_CACHE_*` environment variables, in increasing priority.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `REQUEST_CACHE_DEFAULT_OPTIONS__FAIL_SILENTLY=false`.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut figment = Figment::from(Serialized::defaults(CacheConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }

        let config: CacheConfig = figment
            .merge(Env::prefixed("REQUEST_CACHE_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_entries == Some(0) {
            return Err(Error::Config("max_entries must be at least 1".to_string()));
        }
        if let Some(ttl_ms) = self.ttl_ms {
            if ttl_ms <= 0 || ttl_ms > MAX_TTL_MS {
                return Err(Error::Config(format!(
                    "ttl_ms must be between 1 and {}, got {}",
                    MAX_TTL_MS, ttl_ms
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn test_defaults_retain_everything() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_entries, None);
        assert_eq!(config.ttl(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_new_converts_ttl() {
        let config = CacheConfig::new(Some(50), Some(Duration::seconds(2)));
        assert_eq!(config.ttl_ms, Some(2000));
        assert_eq!(config.ttl(), Some(Duration::seconds(2)));
    }

    #[test]
    fn test_ttl_bounds() {
        let config = |ttl_ms| CacheConfig {
            ttl_ms: Some(ttl_ms),
            ..CacheConfig::default()
        };
        assert!(config(MAX_TTL_MS).validate().is_ok());
        assert!(config(MAX_TTL_MS + 1).validate().is_err());
        assert!(config(0).validate().is_err());
        assert_eq!(config(MAX_TTL_MS).ttl(), Some(Duration::days(365)));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = TempDir::new("request-cache-config").unwrap();
        let path = dir.path().join("cache.yaml");
        fs::write(
            &path,
            "max_entries: 250\nttl_ms: 30000\ndefault_options:\n  fail_silently: false\n",
        )
        .unwrap();

        let config = CacheConfig::load(Some(&path)).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_entries, Some(250));
        assert_eq!(config.ttl(), Some(Duration::seconds(30)));
        assert_eq!(config.default_options, CallOptions::strict());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new("request-cache-config").unwrap();
        let path = dir.path().join("cache.yaml");
        fs::write(&path, "max_entries: 0\n").unwrap();

        let err = CacheConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        fs::write(&path, "ttl_ms: 9223372036854775807\n").unwrap();
        assert!(matches!(
            CacheConfig::load(Some(&path)).unwrap_err(),
            Error::Config(_)
        ));

        fs::write(&path, "ttl_ms: many\n").unwrap();
        assert!(matches!(
            CacheConfig::load(Some(&path)).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new("request-cache-config").unwrap();
        let config = CacheConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config, CacheConfig::default());
    }
}
