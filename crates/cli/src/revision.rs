//! Revision tokens: lowercase hex of the file's modification time in milliseconds.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn millis_hex(time: SystemTime) -> String {
    let millis = time.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    format!("{millis:x}")
}

/// Revision of `path`, or of `fallback` (the build start time) if the file cannot be stat'ed.
pub fn revision_of(path: &Path, fallback: SystemTime) -> String {
    match std::fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => millis_hex(modified),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot read modification time; using build timestamp");
            millis_hex(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_revision_is_hex_of_mtime_millis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        let file = File::create(&path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123)).unwrap();

        assert_eq!(revision_of(&path, SystemTime::now()), format!("{:x}", 1_700_000_000_123u64));
    }

    #[test]
    fn test_revision_changes_with_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        let file = File::create(&path).unwrap();

        file.set_modified(UNIX_EPOCH + Duration::from_secs(1_000)).unwrap();
        let first = revision_of(&path, SystemTime::now());
        file.set_modified(UNIX_EPOCH + Duration::from_secs(2_000)).unwrap();
        let second = revision_of(&path, SystemTime::now());

        assert_ne!(first, second);
    }

    #[test]
    fn test_missing_file_falls_back_to_build_time() {
        let fallback = UNIX_EPOCH + Duration::from_millis(255);
        assert_eq!(revision_of(Path::new("/no/such/file.js"), fallback), "ff");
    }
}
