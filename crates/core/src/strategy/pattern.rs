//! URL path patterns used by strategy rules.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A pattern matched against the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlPattern {
    /// The application root, `/`.
    Root,
    /// Any of the listed paths, compared exactly.
    Exact { paths: Vec<String> },
    /// Paths starting with any of the listed prefixes.
    Prefix { prefixes: Vec<String> },
    /// Paths whose last segment ends in one of the extensions (case-insensitive, no dot).
    Extension { extensions: Vec<String> },
    /// Paths matching a regular expression.
    Regex { pattern: PathRegex },
}

impl UrlPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            UrlPattern::Root => path == "/",
            UrlPattern::Exact { paths } => paths.iter().any(|p| p == path),
            UrlPattern::Prefix { prefixes } => prefixes.iter().any(|p| path.starts_with(p.as_str())),
            UrlPattern::Extension { extensions } => match extension_of(path) {
                Some(ext) => extensions
                    .iter()
                    .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
                None => false,
            },
            UrlPattern::Regex { pattern } => pattern.0.is_match(path),
        }
    }

    /// Convenience constructor for extension rules.
    pub fn extensions(list: &[&str]) -> Self {
        UrlPattern::Extension { extensions: list.iter().map(|e| e.to_string()).collect() }
    }
}

fn extension_of(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() { None } else { Some(ext) }
}

/// A compiled regex that serializes as its source string.
///
/// Invalid expressions are rejected while deserializing, so a loaded strategy
/// table can always classify without failing.
#[derive(Debug, Clone)]
pub struct PathRegex(Regex);

impl PathRegex {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Serialize for PathRegex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for PathRegex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        PathRegex::new(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_matches_only_root() {
        assert!(UrlPattern::Root.matches("/"));
        assert!(!UrlPattern::Root.matches("/index.html"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let pattern = UrlPattern::extensions(&["png", ".JPG"]);
        assert!(pattern.matches("/logo.png"));
        assert!(pattern.matches("/img/Hero.PNG"));
        assert!(pattern.matches("/img/photo.jpg"));
        assert!(!pattern.matches("/logo.png/details"));
        assert!(!pattern.matches("/.png"));
        assert!(!pattern.matches("/products"));
    }

    #[test]
    fn test_prefix_and_exact() {
        let prefix = UrlPattern::Prefix { prefixes: vec!["/api/".into()] };
        assert!(prefix.matches("/api/cart"));
        assert!(!prefix.matches("/apiary"));

        let exact = UrlPattern::Exact { paths: vec!["/offline.html".into()] };
        assert!(exact.matches("/offline.html"));
        assert!(!exact.matches("/offline.html/x"));
    }

    #[test]
    fn test_regex_round_trips_through_json() {
        let json = r#"{"kind":"regex","pattern":"^/products/[0-9]+$"}"#;
        let pattern: UrlPattern = serde_json::from_str(json).unwrap();
        assert!(pattern.matches("/products/42"));
        assert!(!pattern.matches("/products/abc"));
        assert_eq!(serde_json::to_string(&pattern).unwrap(), json);
    }

    #[test]
    fn test_invalid_regex_rejected_on_load() {
        let json = r#"{"kind":"regex","pattern":"(unclosed"}"#;
        assert!(serde_json::from_str::<UrlPattern>(json).is_err());
    }
}
