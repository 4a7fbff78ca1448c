//! Writing the manifest artifact.

use std::io::Write;
use std::path::Path;

use offgrid_core::{Manifest, PrecacheEntry, StrategyTable};
use tempfile::NamedTempFile;

use crate::error::GenerateError;

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> GenerateError + '_ {
    move |source| GenerateError::Write { path: path.to_path_buf(), source }
}

/// Write `{timestamp, precache, config}` to `output`, entries sorted by URL.
///
/// The JSON is written to a temporary file beside `output` and renamed into
/// place, so a failure at any point leaves no partial manifest behind.
pub fn emit_manifest(
    entries: Vec<PrecacheEntry>, config: &StrategyTable, timestamp: i64, output: &Path,
) -> Result<Manifest, GenerateError> {
    let manifest = Manifest::new(timestamp, entries, config.clone());
    let json = manifest.to_json()?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_failed(dir))?;

    let mut file = NamedTempFile::new_in(dir).map_err(write_failed(dir))?;
    file.write_all(json.as_bytes()).map_err(write_failed(output))?;
    file.write_all(b"\n").map_err(write_failed(output))?;
    file.as_file().sync_all().map_err(write_failed(output))?;
    file.persist(output).map_err(|e| GenerateError::Write { path: output.to_path_buf(), source: e.error })?;

    tracing::info!(path = %output.display(), entries = manifest.precache.len(), "manifest written");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use offgrid_core::CacheNames;

    use super::*;

    fn table() -> StrategyTable {
        StrategyTable::standard(CacheNames::new("offgrid", "v1"), vec!["/api/".into()])
    }

    #[test]
    fn test_emit_sorts_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("dist/precache-manifest.json");
        let entries = vec![
            PrecacheEntry::new("/b.js", "2"),
            PrecacheEntry::new("/a.css", "1"),
            PrecacheEntry::new("/", "3"),
        ];

        emit_manifest(entries, &table(), 1_700_000_000_000, &output).unwrap();

        let loaded = Manifest::load(&output).unwrap();
        assert_eq!(loaded.timestamp, 1_700_000_000_000);
        let urls: Vec<&str> = loaded.precache.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/", "/a.css", "/b.js"]);
        assert_eq!(loaded.config.expected_buckets(), table().expected_buckets());
    }

    #[test]
    fn test_emit_failure_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("taken");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("occupant"), "x").unwrap();

        let result = emit_manifest(vec![PrecacheEntry::new("/a.js", "1")], &table(), 0, &output);
        assert!(matches!(result, Err(GenerateError::Write { .. })));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("taken")]);
    }
}
