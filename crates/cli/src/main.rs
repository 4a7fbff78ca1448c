//! offgrid-manifest: build-time precache manifest generator.
//!
//! Scans the build output, stamps each file with a revision and writes the
//! manifest the worker precaches at install. Any failure exits non-zero and
//! leaves no manifest behind.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Parser;
use offgrid_core::{AppConfig, PrecacheEntry};
use tracing_subscriber::EnvFilter;

mod emit;
mod error;
mod revision;
mod scan;

#[derive(Parser, Debug)]
#[command(name = "offgrid-manifest")]
#[command(about = "Generate the precache manifest for the offline worker")]
struct Args {
    /// Compiled output directory to scan
    #[arg(long, env = "OFFGRID_BUILD_DIR", default_value = "dist")]
    build_dir: PathBuf,

    /// Strategy configuration (TOML); must exist
    #[arg(long, env = "OFFGRID_CONFIG_FILE")]
    config: PathBuf,

    /// Manifest path (default: the configured manifest_path)
    #[arg(long, env = "OFFGRID_MANIFEST_PATH")]
    output: Option<PathBuf>,

    /// Glob of files to precache, relative to the build directory (repeatable; default: everything)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Glob of files to leave out (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// URL path the build directory is served under
    #[arg(long, default_value = "/")]
    url_prefix: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let started = SystemTime::now();
    let timestamp = chrono::Utc::now().timestamp_millis();

    let config = AppConfig::load_file(&args.config)
        .with_context(|| format!("loading strategy config {}", args.config.display()))?;
    let table = config.strategy_table();
    let output = args.output.unwrap_or_else(|| config.manifest_path.clone());

    let patterns = scan::Patterns::new(&args.include, &args.exclude)?.skip_output(&args.build_dir, &output);
    let mut entries = Vec::new();
    for path in scan::scan(&args.build_dir, &patterns) {
        let path = path?;
        let relative = scan::relative_path(&args.build_dir, &path)?;
        let revision = revision::revision_of(&path, started);
        entries.push(PrecacheEntry::new(scan::to_url(&args.url_prefix, &relative), revision));
    }

    tracing::info!(build_dir = %args.build_dir.display(), files = entries.len(), "scan complete");

    emit::emit_manifest(entries, &table, timestamp, &output)
        .with_context(|| format!("writing manifest {}", output.display()))?;

    Ok(())
}
