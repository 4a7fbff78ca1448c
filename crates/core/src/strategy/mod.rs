//! Declarative routing of requests to caching strategies.
//!
//! A [`StrategyTable`] is an ordered list of [`Rule`]s. Rules are evaluated in
//! declaration order and the first match wins; when nothing matches, a fixed
//! default derived from the request class (navigation, API, other) applies.
//! The table is plain data: classification looks only at the request method,
//! URL and mode, never at the network or the cache, and never fails.
//!
//! | Class      | Default strategy | Default bucket |
//! |------------|------------------|----------------|
//! | Navigation | network-first    | app-shell      |
//! | API        | network-first    | api            |
//! | Other      | cache-first      | assets         |

pub mod names;
pub mod pattern;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::Request;

pub use names::CacheNames;
pub use pattern::{PathRegex, UrlPattern};

/// One of the five caching algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    CacheOnly,
    NetworkOnly,
}

impl Strategy {
    /// Whether the strategy ever reads from or writes to a bucket.
    pub fn uses_cache(self) -> bool {
        self != Strategy::NetworkOnly
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::CacheOnly => "cache-only",
            Strategy::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-bucket expiration policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    /// Keep at most this many entries; the oldest are trimmed after a write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,

    /// Entries older than this are treated as misses and removed on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u64>,
}

impl Expiration {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self { max_entries: Some(max_entries), max_age_seconds: Some(max_age.as_secs()) }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_seconds.map(Duration::from_secs)
    }
}

/// A routing rule: requests whose path matches `pattern` use `strategy` against `bucket`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub pattern: UrlPattern,
    pub strategy: Strategy,
    /// Logical bucket class; resolved to a versioned name through [`CacheNames`].
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
}

impl Rule {
    pub fn new(name: &str, pattern: UrlPattern, strategy: Strategy, bucket: &str) -> Self {
        Self { name: name.to_string(), pattern, strategy, bucket: bucket.to_string(), expiration: None }
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// Coarse request category used when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Navigation,
    Api,
    Other,
}

/// Where and how a request is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub strategy: Strategy,
    /// Versioned bucket name.
    pub bucket: String,
    pub expiration: Option<Expiration>,
}

/// Result of classifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A rule matched; `index` is its position in the table.
    Matched { rule: String, index: usize, route: Route },
    /// No rule matched; the default for the request class applies.
    Fallback { class: RequestClass, route: Route },
}

impl Classification {
    pub fn route(&self) -> &Route {
        match self {
            Classification::Matched { route, .. } | Classification::Fallback { route, .. } => route,
        }
    }

    pub fn into_route(self) -> Route {
        match self {
            Classification::Matched { route, .. } | Classification::Fallback { route, .. } => route,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.route().strategy
    }

    pub fn bucket(&self) -> &str {
        &self.route().bucket
    }
}

/// Ordered, immutable routing table shared by the worker and the manifest generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTable {
    pub names: CacheNames,
    /// Path prefixes that identify API requests.
    pub api_prefixes: Vec<String>,
    pub rules: Vec<Rule>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];
const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "map", "json", "txt", "xml", "webmanifest"];

const DAY: u64 = 24 * 60 * 60;

impl StrategyTable {
    pub fn new(names: CacheNames, api_prefixes: Vec<String>, rules: Vec<Rule>) -> Self {
        Self { names, api_prefixes, rules }
    }

    /// The storefront's standard rule set.
    ///
    /// Order matters: the API rule precedes the extension rules so that
    /// `/api/products.json` is treated as an API response, not a static file.
    pub fn standard(names: CacheNames, api_prefixes: Vec<String>) -> Self {
        let rules = vec![
            Rule::new(
                "app-shell",
                UrlPattern::Root,
                Strategy::NetworkFirst,
                names::APP_SHELL,
            ),
            Rule::new(
                "app-shell-documents",
                UrlPattern::Exact { paths: vec!["/offline.html".into(), "/manifest.json".into()] },
                Strategy::CacheFirst,
                names::APP_SHELL,
            ),
            Rule::new(
                "api",
                UrlPattern::Prefix { prefixes: api_prefixes.clone() },
                Strategy::NetworkFirst,
                names::API,
            )
            .with_expiration(Expiration::new(100, Duration::from_secs(5 * 60))),
            Rule::new(
                "images",
                UrlPattern::extensions(IMAGE_EXTENSIONS),
                Strategy::StaleWhileRevalidate,
                names::IMAGES,
            )
            .with_expiration(Expiration::new(60, Duration::from_secs(30 * DAY))),
            Rule::new(
                "fonts",
                UrlPattern::extensions(FONT_EXTENSIONS),
                Strategy::CacheFirst,
                names::FONTS,
            )
            .with_expiration(Expiration::new(30, Duration::from_secs(365 * DAY))),
            Rule::new(
                "static",
                UrlPattern::extensions(STATIC_EXTENSIONS),
                Strategy::CacheFirst,
                names::ASSETS,
            )
            .with_expiration(Expiration::new(200, Duration::from_secs(30 * DAY))),
        ];

        Self::new(names, api_prefixes, rules)
    }

    /// Classify a request. First matching rule wins; otherwise the class default applies.
    pub fn classify(&self, request: &Request) -> Classification {
        let path = request.path();

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.pattern.matches(path) {
                return Classification::Matched {
                    rule: rule.name.clone(),
                    index,
                    route: Route {
                        strategy: rule.strategy,
                        bucket: self.names.versioned(&rule.bucket),
                        expiration: rule.expiration,
                    },
                };
            }
        }

        let class = self.request_class(request);
        Classification::Fallback { class, route: self.default_route(class) }
    }

    pub fn request_class(&self, request: &Request) -> RequestClass {
        if request.is_navigation() {
            RequestClass::Navigation
        } else if self.is_api_path(request.path()) {
            RequestClass::Api
        } else {
            RequestClass::Other
        }
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        self.api_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Route used when no rule matches a request of the given class.
    pub fn default_route(&self, class: RequestClass) -> Route {
        let (strategy, bucket) = match class {
            RequestClass::Navigation => (Strategy::NetworkFirst, names::APP_SHELL),
            RequestClass::Api => (Strategy::NetworkFirst, names::API),
            RequestClass::Other => (Strategy::CacheFirst, names::ASSETS),
        };
        Route { strategy, bucket: self.names.versioned(bucket), expiration: None }
    }

    /// Bucket that receives the precache manifest at install time.
    pub fn precache_bucket(&self) -> String {
        self.names.versioned(names::APP_SHELL)
    }

    /// Every bucket name this version may write to. Anything else is garbage at activation.
    pub fn expected_buckets(&self) -> BTreeSet<String> {
        let mut expected: BTreeSet<String> = self
            .rules
            .iter()
            .filter(|rule| rule.strategy.uses_cache())
            .map(|rule| self.names.versioned(&rule.bucket))
            .collect();

        for class in [RequestClass::Navigation, RequestClass::Api, RequestClass::Other] {
            expected.insert(self.default_route(class).bucket);
        }
        expected.insert(self.precache_bucket());
        expected
    }
}
