//! Bodies of the `locus` subcommands.
//!
//! The binary parses arguments and prints; everything that touches a store
//! lives here.

use crate::builder::DBBuilder;
use crate::db::DB;
use crate::error::{LocusError, Result};
use crate::types::{Config, DbStats};
use std::fmt;
use std::io;
use std::path::Path;
use tracing::info;

/// Read the configuration file if one was given, defaults otherwise.
#[cfg(feature = "toml")]
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

#[cfg(not(feature = "toml"))]
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(_) => Err(LocusError::Config(
            "configuration files require the `toml` feature".to_string(),
        )),
        None => Ok(Config::default()),
    }
}

/// Open the store `serve` runs on: persisted at `data`, or in memory.
pub fn open_store(data: Option<&Path>, config: Config) -> Result<DB> {
    let builder = DBBuilder::new().config(config);
    match data {
        Some(path) => builder.aof_path(path).build(),
        None => builder.in_memory().build(),
    }
}

/// Log sizes around an offline compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactReport {
    pub before: u64,
    pub after: u64,
}

impl fmt::Display for CompactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} bytes", self.before, self.after)
    }
}

/// Rewrite an existing store's log so it holds only live records.
pub fn compact(data: &Path, config: Config) -> Result<CompactReport> {
    ensure_exists(data)?;
    let db = DBBuilder::new().aof_path(data).config(config).build()?;

    let before = db.stats()?.aof_size;
    db.compact()?;
    let after = db.stats()?.aof_size;
    db.close()?;

    info!(path = %data.display(), before, after, "compacted");
    Ok(CompactReport { before, after })
}

/// Statistics of an existing store.
pub fn stats(data: &Path) -> Result<DbStats> {
    ensure_exists(data)?;
    let db = DB::open(data)?;
    let stats = db.stats()?;
    db.close()?;
    Ok(stats)
}

/// Human-readable summary printed by `locus stats`.
pub fn format_stats(stats: &DbStats) -> String {
    format!(
        "addresses:  {}\nnext id:    {}\nindexed:    {}\nunindexed:  {}\nlog bytes:  {}",
        stats.address_count,
        stats.next_id,
        stats.indexed_count,
        stats.unindexed_count,
        stats.aof_size
    )
}

/// Offline commands never create a store as a side effect.
fn ensure_exists(data: &Path) -> Result<()> {
    if data.is_file() {
        Ok(())
    } else {
        Err(LocusError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no store at {}", data.display()),
        )))
    }
}
