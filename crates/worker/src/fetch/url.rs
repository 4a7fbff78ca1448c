//! URL handling for interception decisions and precache resolution.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Whether the bucket store can hold responses for this URL.
///
/// Only `http` and `https` are fetchable. Extension-origin schemes
/// (`chrome-extension:`, `moz-extension:`, ...) and everything else are left
/// to the browser.
pub fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Same scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Parse an origin such as `https://shop.example.com`.
///
/// Host is lowercased by the URL parser; any path, query or fragment is dropped.
pub fn parse_origin(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    if !is_fetchable(&parsed) {
        return Err(UrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    parsed.set_path("/");
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed)
}

/// Resolve an absolute path (e.g. a manifest entry) against the origin.
///
/// Fails for anything that would leave the origin, such as `//cdn.test/x.js`.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, UrlError> {
    if path.trim().is_empty() {
        return Err(UrlError::Empty);
    }

    let resolved = origin.join(path).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    if !same_origin(origin, &resolved) {
        return Err(UrlError::InvalidUrl(format!("{path} resolves outside {origin}")));
    }
    Ok(resolved)
}
