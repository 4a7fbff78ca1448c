//! Build-directory scanning.
//!
//! Paths are matched relative to the build directory with `/` separators, so
//! `assets/**/*.js` means the same thing on every platform.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::GenerateError;

/// Include and exclude globs.
#[derive(Debug, Clone)]
pub struct Patterns {
    /// `None` includes everything.
    include: Option<GlobSet>,
    exclude: GlobSet,
    /// Relative path of the manifest when it is written inside the build directory.
    output: Option<String>,
}

fn build(patterns: &[String]) -> Result<GlobSet, GenerateError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|source| GenerateError::Pattern { pattern: pattern.clone(), source })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| GenerateError::Pattern { pattern: patterns.join(","), source })
}

impl Patterns {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, GenerateError> {
        let include = if include.is_empty() { None } else { Some(build(include)?) };
        Ok(Self { include, exclude: build(exclude)?, output: None })
    }

    /// Never precache `output`, so a rebuild does not pick up the previous manifest.
    ///
    /// Paths are compared after canonicalization; an output outside `build_dir`
    /// (or one whose directory does not exist yet) changes nothing.
    pub fn skip_output(mut self, build_dir: &Path, output: &Path) -> Self {
        self.output = output_relative_to(build_dir, output);
        self
    }

    /// Whether a relative, `/`-separated path is part of the precache.
    pub fn matches(&self, relative: &str) -> bool {
        if self.output.as_deref() == Some(relative) {
            return false;
        }
        let included = self.include.as_ref().is_none_or(|set| set.is_match(relative));
        included && !self.exclude.is_match(relative)
    }
}

fn output_relative_to(build_dir: &Path, output: &Path) -> Option<String> {
    let root = build_dir.canonicalize().ok()?;
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let output = dir.canonicalize().ok()?.join(output.file_name()?);
    let relative = output.strip_prefix(&root).ok()?;
    relative_path(Path::new(""), relative).ok()
}

/// Lazily walk `build_dir`, yielding every matching file in file-name order.
///
/// Directories are skipped; an entry that cannot be read is an error.
pub fn scan<'a>(
    build_dir: &'a Path, patterns: &'a Patterns,
) -> impl Iterator<Item = Result<PathBuf, GenerateError>> + 'a {
    WalkDir::new(build_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };
            if !entry.file_type().is_file() {
                return None;
            }

            match relative_path(build_dir, entry.path()) {
                Ok(relative) => patterns.matches(&relative).then(|| Ok(entry.into_path())),
                Err(err) => Some(Err(err)),
            }
        })
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_path(root: &Path, path: &Path) -> Result<String, GenerateError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| GenerateError::NonUtf8Path(path.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Absolute URL path of a file served under `url_prefix`.
pub fn to_url(url_prefix: &str, relative: &str) -> String {
    let prefix = url_prefix.trim_end_matches('/');
    let prefix = if prefix.starts_with('/') { prefix.to_string() } else { format!("/{prefix}") };
    if prefix == "/" { format!("/{relative}") } else { format!("{prefix}/{relative}") }
}
