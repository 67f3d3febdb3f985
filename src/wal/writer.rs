//! WAL Writer
//!
//! Handles appending records to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::clock;
use crate::error::Result;

use super::WalOp;

/// Appends records to the WAL file
pub struct WalWriter {
    /// Buffered file writer (drained and fsynced on every append)
    file: BufWriter<File>,
}

impl WalWriter {
    /// Open the WAL in append mode, creating it (0644) if absent.
    ///
    /// Never truncates: existing records must survive until recovery has
    /// replayed them or a clean shutdown has checkpointed them.
    pub fn open(path: &Path) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(path)?;

        Ok(WalWriter {
            file: BufWriter::new(file),
        })
    }

    /// Append one record and force it to disk.
    ///
    /// Returns only after the record is durable; a write that has not
    /// survived `append` must never reach the memtable.
    pub fn append(&mut self, op: WalOp, key: &[u8], value: &[u8]) -> Result<()> {
        self.file
            .write_all(format!("{}|{}|", clock::unix_seconds(), op.as_str()).as_bytes())?;
        self.file.write_all(key)?;
        self.file.write_all(b"|")?;
        self.file.write_all(value)?;
        self.file.write_all(b"\n")?;

        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        Ok(())
    }

    /// Discard all records (used after a clean-shutdown checkpoint)
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        Ok(())
    }

    /// Flush and fsync any buffered data before the log is dropped
    pub fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}
