//! Precache manifest: the build artifact consumed by the worker's install step.
//!
//! ```json
//! {
//!   "timestamp": 1760000000000,
//!   "precache": [{ "url": "/app.js", "revision": "199a1b2c3d4" }],
//!   "config": { "names": { ... }, "api_prefixes": ["/api/"], "rules": [ ... ] }
//! }
//! ```
//!
//! `precache` is always sorted ascending by `url`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::strategy::StrategyTable;

/// One asset to fetch and store during install.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrecacheEntry {
    /// Absolute URL path, e.g. `/static/app.js`.
    pub url: String,
    /// Opaque token that changes when the file changes between builds.
    pub revision: String,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self { url: url.into(), revision: revision.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Build time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub precache: Vec<PrecacheEntry>,
    /// Snapshot of the strategy table the build was produced with.
    pub config: StrategyTable,
}

impl Manifest {
    /// Build a manifest, sorting entries by URL and dropping duplicate URLs.
    pub fn new(timestamp: i64, mut precache: Vec<PrecacheEntry>, config: StrategyTable) -> Self {
        precache.sort();
        precache.dedup_by(|a, b| a.url == b.url);
        Self { timestamp, precache, config }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let manifest: Manifest = serde_json::from_str(json)?;
        Ok(Self::new(manifest.timestamp, manifest.precache, manifest.config))
    }

    /// Read a manifest written by the generator.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Manifest(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Whether a URL path is part of the precache set.
    pub fn contains(&self, path: &str) -> bool {
        self.precache
            .binary_search_by(|entry| entry.url.as_str().cmp(path))
            .is_ok()
    }
}
