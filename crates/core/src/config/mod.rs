//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFGRID_*)
//! 2. TOML config file (if OFFGRID_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is immutable: the worker and the manifest generator each
//! receive the [`StrategyTable`] built from it at construction time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::strategy::{CacheNames, Rule, StrategyTable};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFGRID_*)
/// 2. TOML config file (if OFFGRID_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite bucket store.
    ///
    /// Set via OFFGRID_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the worker serves, e.g. `https://shop.example.com`.
    ///
    /// Manifest paths are resolved against it and only same-origin requests are intercepted.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Registration scope path.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Prefix for every bucket name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix for bucket names. Bump to invalidate every bucket on the next activation.
    ///
    /// Set via OFFGRID_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Per-class version overrides, e.g. `{ fonts = "v1" }` keeps fonts across a bump.
    #[serde(default)]
    pub bucket_versions: BTreeMap<String, String>,

    /// Path prefixes treated as API requests.
    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Document served when a navigation fails with no network and no cached copy.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    /// Precache manifest produced by `offgrid-manifest`.
    ///
    /// Set via OFFGRID_MANIFEST_PATH environment variable.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// How long an accepting client waits for the controller change before reloading anyway.
    #[serde(default = "default_reload_timeout_ms")]
    pub reload_timeout_ms: u64,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Explicit rule list replacing the standard storefront rules.
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offgrid-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_scope() -> String {
    "/".into()
}

fn default_cache_prefix() -> String {
    "offgrid".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_api_prefixes() -> Vec<String> {
    vec!["/api/".into()]
}

fn default_offline_fallback() -> String {
    "/offline.html".into()
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("./dist/precache-manifest.json")
}

fn default_reload_timeout_ms() -> u64 {
    3_000
}

fn default_user_agent() -> String {
    "offgrid/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            scope: default_scope(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            bucket_versions: BTreeMap::new(),
            api_prefixes: default_api_prefixes(),
            offline_fallback: default_offline_fallback(),
            manifest_path: default_manifest_path(),
            reload_timeout_ms: default_reload_timeout_ms(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            rules: None,
        }
    }
}

impl AppConfig {
    /// Network timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_timeout_ms)
    }

    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            prefix: self.cache_prefix.clone(),
            version: self.cache_version.clone(),
            overrides: self.bucket_versions.clone(),
        }
    }

    /// Build the strategy table: explicit `rules` if configured, else the standard set.
    pub fn strategy_table(&self) -> StrategyTable {
        match &self.rules {
            Some(rules) => StrategyTable::new(self.cache_names(), self.api_prefixes.clone(), rules.clone()),
            None => StrategyTable::standard(self.cache_names(), self.api_prefixes.clone()),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFGRID_`
    /// 2. TOML file from `OFFGRID_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFGRID_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(Self::env()))
    }

    /// Load configuration from a specific TOML file, which must exist.
    ///
    /// Used by build tooling, where a missing strategy config is fatal rather
    /// than silently replaced by defaults. Environment overrides still apply.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::LoadFailed` if the file cannot be read or parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("cannot read {}: {e}", path.display())))?;

        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(&contents))
            .merge(Self::env());

        Self::extract(figment)
    }

    fn env() -> Env {
        Env::prefixed("OFFGRID_")
            .map(|key| key.as_str().to_lowercase().into())
            .split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./offgrid-cache.sqlite"));
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.cache_version, "v1");
        assert_eq!(config.api_prefixes, vec!["/api/".to_string()]);
        assert_eq!(config.offline_fallback, "/offline.html");
        assert_eq!(config.reload_timeout_ms, 3_000);
        assert!(config.rules.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.reload_timeout(), Duration::from_millis(3_000));
    }

    #[test]
    fn test_strategy_table_uses_names_and_overrides() {
        let mut config = AppConfig::default();
        config.bucket_versions.insert("fonts".into(), "v0".into());
        let table = config.strategy_table();

        let expected = table.expected_buckets();
        assert!(expected.contains("offgrid-fonts-v0"));
        assert!(expected.contains("offgrid-images-v1"));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "offgrid.toml",
                r#"
                origin = "https://shop.example.com"
                cache_version = "v7"
                api_prefixes = ["/api/", "/graphql"]
                "#,
            )?;
            jail.set_env("OFFGRID_CONFIG_FILE", "offgrid.toml");
            jail.set_env("OFFGRID_RELOAD_TIMEOUT_MS", "1500");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.origin, "https://shop.example.com");
            assert_eq!(config.cache_version, "v7");
            assert_eq!(config.api_prefixes.len(), 2);
            assert_eq!(config.reload_timeout_ms, 1500);
            Ok(())
        });
    }

    #[test]
    fn test_load_file_with_rules() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rules.toml",
                r#"
                [[rules]]
                name = "images"
                strategy = "stale-while-revalidate"
                bucket = "images"
                pattern = { kind = "extension", extensions = ["png"] }
                "#,
            )?;

            let config = AppConfig::load_file("rules.toml").map_err(|e| e.to_string())?;
            let table = config.strategy_table();
            assert_eq!(table.rules.len(), 1);
            assert_eq!(table.rules[0].strategy, Strategy::StaleWhileRevalidate);
            Ok(())
        });
    }

    #[test]
    fn test_load_file_missing_is_error() {
        let result = AppConfig::load_file("/definitely/not/offgrid.toml");
        assert!(matches!(result, Err(ConfigError::LoadFailed(_))));
    }
}
