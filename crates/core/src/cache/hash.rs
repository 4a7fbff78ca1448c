//! Request identity keys.

use sha2::{Digest, Sha256};
use url::Url;

/// Compute the bucket key for a request: SHA-256 over the upper-case method and
/// the canonical URL (fragment removed, query preserved).
pub fn request_key(method: &str, url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
