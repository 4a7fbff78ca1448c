//! Manifest generation errors. Every one of them aborts the build.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("INVALID_PATTERN: {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("SCAN_FAILED: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("SCAN_FAILED: {} is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("WRITE_FAILED: {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] offgrid_core::Error),
}
