//! Configuration for EmberKV
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

/// Main configuration for an EmberKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for all data files
    pub data_dir: PathBuf,

    /// Max size of the active memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// Number of SSTables that triggers a background compaction
    pub compaction_threshold: usize,

    /// How long a rotation waits for an in-flight flush before giving up
    /// with `StillFlushing` (milliseconds)
    pub rotation_deadline_ms: u64,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// WAL file name (relative to data_dir)
    pub wal_filename: PathBuf,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./emberkv_data"),
            memtable_size_limit: 4 * 1024 * 1024, // 4 MiB
            compaction_threshold: 5,
            rotation_deadline_ms: 5000,
            wal_filename: PathBuf::from("wal.log"),
            listen_addr: "127.0.0.1:6380".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full path of the WAL file
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_filename)
    }

    /// Sanity-check the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(crate::EmberError::Config(
                "memtable_size_limit must be non-zero".to_string(),
            ));
        }
        if self.compaction_threshold < 2 {
            return Err(crate::EmberError::Config(
                "compaction_threshold must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn memtable_size_limit(mut self, bytes: usize) -> Self {
        self.config.memtable_size_limit = bytes;
        self
    }

    pub fn compaction_threshold(mut self, count: usize) -> Self {
        self.config.compaction_threshold = count;
        self
    }

    pub fn rotation_deadline_ms(mut self, ms: u64) -> Self {
        self.config.rotation_deadline_ms = ms;
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
