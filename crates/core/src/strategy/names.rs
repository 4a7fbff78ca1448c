//! Versioned bucket naming.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Application shell: root document, offline fallback, precached build output.
pub const APP_SHELL: &str = "app-shell";
/// Generic static assets (scripts, styles, data files).
pub const ASSETS: &str = "assets";
/// API responses.
pub const API: &str = "api";
pub const IMAGES: &str = "images";
pub const FONTS: &str = "fonts";

/// Maps a logical bucket class to the concrete, versioned bucket name.
///
/// `overrides` lets a single class move to a new version while the others keep
/// their existing buckets (and contents) across a worker update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    pub prefix: String,
    pub version: String,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl CacheNames {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), version: version.into(), overrides: BTreeMap::new() }
    }

    /// Pin one class to its own version.
    pub fn with_override(mut self, class: impl Into<String>, version: impl Into<String>) -> Self {
        self.overrides.insert(class.into(), version.into());
        self
    }

    /// `{prefix}-{class}-{version}`, or `{class}-{version}` when the prefix is empty.
    pub fn versioned(&self, class: &str) -> String {
        let version = self.overrides.get(class).unwrap_or(&self.version);
        if self.prefix.is_empty() {
            format!("{class}-{version}")
        } else {
            format!("{}-{class}-{version}", self.prefix)
        }
    }
}
