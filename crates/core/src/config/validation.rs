//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `scope`, `offline_fallback` or an API prefix does not start with `/`
    /// - `cache_version` or a bucket version override is empty
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `reload_timeout_ms` is less than 100ms or exceeds 1 minute
    /// - `user_agent` is empty
    /// - an explicit `rules` list is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(_) => return Err(invalid("origin", "scheme must be http or https")),
            Err(e) => return Err(invalid("origin", &e.to_string())),
        }

        if !self.scope.starts_with('/') {
            return Err(invalid("scope", "must start with '/'"));
        }
        if !self.offline_fallback.starts_with('/') {
            return Err(invalid("offline_fallback", "must be an absolute path"));
        }
        if let Some(prefix) = self.api_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "api_prefixes".into(),
                reason: format!("'{prefix}' must start with '/'"),
            });
        }

        if self.cache_version.trim().is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if let Some((class, _)) = self.bucket_versions.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "bucket_versions".into(),
                reason: format!("version for '{class}' must not be empty"),
            });
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.reload_timeout_ms < 100 {
            return Err(invalid("reload_timeout_ms", "must be at least 100ms"));
        }
        if self.reload_timeout_ms > 60_000 {
            return Err(invalid("reload_timeout_ms", "must not exceed 1 minute (60000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(rules) = &self.rules {
            if rules.is_empty() {
                return Err(invalid("rules", "must not be empty when set; omit it for the standard rules"));
            }
        } else if self.api_prefixes.is_empty() {
            tracing::warn!("api_prefixes is empty; the standard API rule will never match");
        }

        Ok(())
    }
}
