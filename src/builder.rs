//! Database builder for flexible configuration
//!
//! This module provides a builder pattern for creating databases with
//! a persistence path and configuration.

use crate::db::{DBInner, DB};
use crate::error::Result;
use crate::persistence::AOFFile;
use crate::types::Config;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Builder for creating database instances with custom configuration.
///
/// # Examples
///
/// ## In-memory database
/// ```rust
/// use locus::DBBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = DBBuilder::new()
///     .in_memory()
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Persistent database with strict coordinates
/// ```rust
/// use locus::{Config, CoordinatePolicy, DBBuilder, SyncPolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default()
///     .with_sync_policy(SyncPolicy::Always)
///     .with_coordinate_policy(CoordinatePolicy::Strict);
///
/// let temp_path = std::env::temp_dir().join("locus_builder_doc.aof");
/// let db = DBBuilder::new()
///     .aof_path(&temp_path)
///     .config(config)
///     .build()?;
/// # drop(db);
/// # std::fs::remove_file(temp_path)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DBBuilder {
    aof_path: Option<PathBuf>,
    config: Config,
    in_memory: bool,
}

impl DBBuilder {
    /// Create a new database builder with default configuration.
    ///
    /// By default, creates an in-memory database. Use `aof_path()` to
    /// enable persistence.
    pub fn new() -> Self {
        Self {
            aof_path: None,
            config: Config::default(),
            in_memory: true,
        }
    }

    /// Set the AOF (Append-Only File) path for persistence.
    ///
    /// If the file exists it is replayed on `build()`; otherwise it is created.
    pub fn aof_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.aof_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Create an in-memory database with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self.aof_path = None;
        self
    }

    /// Set the database configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the database with the configured options.
    ///
    /// Opens and replays the AOF when persistence is enabled, then builds the
    /// spatial index over the restored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the AOF file cannot
    /// be opened, or it contains an undecodable frame.
    pub fn build(self) -> Result<DB> {
        self.config.validate()?;

        let sync_policy = self.config.sync_policy;
        let mut inner = DBInner::new(self.config);

        if !self.in_memory {
            if let Some(aof_path) = self.aof_path {
                let mut aof_file = AOFFile::open_with_policy(&aof_path, sync_policy)?;
                inner.load_from_aof(&mut aof_file)?;
                inner.aof_file = Some(aof_file);
            }
        }

        Ok(DB {
            inner: Arc::new(RwLock::new(inner)),
        })
    }
}

impl Default for DBBuilder {
    fn default() -> Self {
        Self::new()
    }
}
