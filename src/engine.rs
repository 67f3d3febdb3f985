//! Engine Module
//!
//! The LSM coordinator: owns the WAL, both MemTables and the storage
//! manager, and schedules background flushes and compactions.
//!
//! ## Write path
//! WAL append + fsync → active MemTable insert → (if full) rotate the
//! active table into the immutable slot and flush it in the background.
//! The WAL lock is held across the MemTable insert so the log order and
//! the in-memory order never diverge (lock order: WAL → coordinator →
//! MemTable).
//!
//! ## Read path
//! Under the coordinator read lock: active MemTable, then the immutable
//! MemTable, then SSTables newest → oldest. A tombstone hit anywhere
//! terminates the search as not-found.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{EmberError, Result};
use crate::memtable::{Lookup, MemTable};
use crate::storage::{compaction, CompactionJob, SSTableReader, StorageManager};
use crate::wal::{self, WalOp, WalWriter};

/// Storage statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub memtable_size: usize,
    pub memtable_entries: usize,
    pub has_immutable: bool,
    pub num_sstables: usize,
    pub next_sstable_id: u64,
    pub sstable_total_entries: u64,
}

/// The two in-memory tables guarded by the coordinator lock
struct TableSet {
    /// Mutable table receiving writes
    active: Arc<MemTable>,

    /// Sealed table awaiting flush (present only while a flush is owed)
    immutable: Option<Arc<MemTable>>,
}

/// The main storage engine
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,

    /// Durability first: appended and fsynced before any insert
    wal: Mutex<WalWriter>,

    /// Coordinator lock over the in-memory tables
    tables: RwLock<TableSet>,

    /// On-disk table set
    storage: StorageManager,

    /// Gate for waiting on the immutable slot to clear
    flush_gate: Mutex<()>,
    flush_done: Condvar,

    /// Whether a background flush currently owns the immutable slot
    flush_in_flight: AtomicBool,

    /// Outstanding background flush/compaction threads
    tasks: Mutex<Vec<JoinHandle<()>>>,

    shutting_down: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config.
    ///
    /// On startup:
    /// 1. Create the data directory and open existing SSTables
    /// 2. Open the WAL
    /// 3. Replay the WAL through the normal write path (log suppressed)
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = StorageManager::open(&config.data_dir)?;
        let wal_path = config.wal_path();
        let wal = WalWriter::open(&wal_path)?;

        let inner = Arc::new(EngineInner {
            tables: RwLock::new(TableSet {
                active: Arc::new(MemTable::new(config.memtable_size_limit)),
                immutable: None,
            }),
            wal: Mutex::new(wal),
            storage,
            flush_gate: Mutex::new(()),
            flush_done: Condvar::new(),
            flush_in_flight: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            config,
        });

        let report = wal::replay(&wal_path, |op, key, value| {
            EngineInner::apply(&inner, op, key, value)
        })?;
        if report.records_replayed > 0 {
            info!(
                records = report.records_replayed,
                "recovered unflushed writes from WAL"
            );
        }

        Ok(Engine { inner })
    }

    /// Store a key-value pair (durable once this returns)
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;
        EngineInner::write(&self.inner, WalOp::Set, key, value)
    }

    /// Delete a key (durable once this returns)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        EngineInner::write(&self.inner, WalOp::Del, key, &[])
    }

    /// Get a value by key.
    ///
    /// A read error against an individual SSTable is logged and the
    /// search continues; it never fails the lookup.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let tables = self.inner.tables.read();

        if let Some(hit) = tables.active.lookup(key) {
            return live_value(hit);
        }
        if let Some(immutable) = &tables.immutable {
            if let Some(hit) = immutable.lookup(key) {
                return live_value(hit);
            }
        }

        match self.inner.storage.lookup(key) {
            Some(hit) => live_value(hit),
            None => None,
        }
    }

    /// Synchronously seal and flush the active MemTable
    pub fn flush(&self) -> Result<()> {
        EngineInner::flush_active(&self.inner)
    }

    /// Number of live SSTables
    pub fn sstable_count(&self) -> usize {
        self.inner.storage.sstable_count()
    }

    /// Storage statistics
    pub fn stats(&self) -> Stats {
        let tables = self.inner.tables.read();
        Stats {
            memtable_size: tables.active.size(),
            memtable_entries: tables.active.count(),
            has_immutable: tables.immutable.is_some(),
            num_sstables: self.inner.storage.sstable_count(),
            next_sstable_id: self.inner.storage.next_sstable_id(),
            sstable_total_entries: self.inner.storage.total_entries(),
        }
    }

    /// Close the engine gracefully: join background work, flush what is
    /// left in memory, checkpoint the WAL, release every handle.
    pub fn close(&self) -> Result<()> {
        let inner = &self.inner;
        inner.shutting_down.store(true, Ordering::SeqCst);

        // Flush tasks can spawn compactions, so drain until quiescent.
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tasks = inner.tasks.lock();
                tasks.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("background task panicked during shutdown");
                }
            }
        }

        // A failed background flush may have left the immutable slot
        // occupied; everything still in memory goes to disk now.
        let mut checkpoint_ok = true;
        let leftover = inner.tables.write().immutable.take();
        if let Some(sealed) = leftover {
            checkpoint_ok &= inner.flush_on_close(&sealed);
        }

        let active = {
            let mut tables = inner.tables.write();
            mem::replace(
                &mut tables.active,
                Arc::new(MemTable::new(inner.config.memtable_size_limit)),
            )
        };
        active.make_immutable();
        if !active.is_empty() {
            checkpoint_ok &= inner.flush_on_close(&active);
        }

        // Only a fully flushed engine may discard its log.
        {
            let mut wal = inner.wal.lock();
            if checkpoint_ok {
                wal.truncate()?;
            } else {
                warn!("skipping WAL checkpoint, close-time flush failed");
            }
            wal.close()?;
        }

        inner.storage.close();
        debug!("engine closed");
        Ok(())
    }
}

impl EngineInner {
    /// Log a write, then make it visible. The WAL lock is held across
    /// both steps; on a WAL error the write never reaches the MemTable.
    fn write(inner: &Arc<Self>, op: WalOp, key: &[u8], value: &[u8]) -> Result<()> {
        let mut wal = inner.wal.lock();
        wal.append(op, key, value)?;
        Self::apply(inner, op, key, value)
    }

    /// Insert into the active table and rotate if it filled up. Used by
    /// the write path and by WAL replay (which skips the logging step).
    fn apply(inner: &Arc<Self>, op: WalOp, key: &[u8], value: &[u8]) -> Result<()> {
        let needs_rotation = {
            let tables = inner.tables.write();
            match op {
                WalOp::Set => tables.active.set(key, value)?,
                WalOp::Del => tables.active.delete(key)?,
            }
            tables.active.should_flush()
        };

        if needs_rotation {
            Self::rotate(inner)?;
        }
        Ok(())
    }

    /// Seal the active table, move it to the immutable slot and flush it
    /// in the background.
    ///
    /// If the slot is still occupied by a previous flush, wait on the
    /// flush gate up to the configured deadline, then give up with
    /// `StillFlushing`. A flush that died is re-spawned here; the
    /// rotation attempt is the retry point.
    fn rotate(inner: &Arc<Self>) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(inner.config.rotation_deadline_ms);

        loop {
            // The in-flight flag is claimed under the tables lock so that
            // exactly one flush ever owns a sealed table; the thread
            // itself is spawned after the lock is released.
            let mut respawn = None;
            {
                let mut tables = inner.tables.write();
                if tables.immutable.is_none() {
                    // Re-check: another writer may have rotated already.
                    if !tables.active.should_flush() {
                        return Ok(());
                    }
                    tables.active.make_immutable();
                    let sealed = mem::replace(
                        &mut tables.active,
                        Arc::new(MemTable::new(inner.config.memtable_size_limit)),
                    );
                    tables.immutable = Some(Arc::clone(&sealed));
                    inner.flush_in_flight.store(true, Ordering::SeqCst);
                    drop(tables);

                    Self::spawn_flush(inner, sealed);
                    return Ok(());
                }

                if !inner.flush_in_flight.load(Ordering::SeqCst) {
                    inner.flush_in_flight.store(true, Ordering::SeqCst);
                    respawn = tables.immutable.clone();
                }
            }

            if let Some(sealed) = respawn {
                debug!("re-spawning failed flush before rotation");
                Self::spawn_flush(inner, sealed);
            }

            Self::wait_for_flush_slot(inner, deadline)?;
        }
    }

    /// Synchronous counterpart of rotate + flush, used by `Engine::flush`
    fn flush_active(inner: &Arc<Self>) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(inner.config.rotation_deadline_ms);

        loop {
            let mut respawn = None;
            {
                let mut tables = inner.tables.write();
                if tables.immutable.is_none() {
                    if tables.active.is_empty() {
                        return Ok(());
                    }
                    tables.active.make_immutable();
                    let sealed = mem::replace(
                        &mut tables.active,
                        Arc::new(MemTable::new(inner.config.memtable_size_limit)),
                    );
                    tables.immutable = Some(Arc::clone(&sealed));
                    inner.flush_in_flight.store(true, Ordering::SeqCst);
                    drop(tables);

                    let flushed = inner.storage.flush(&sealed);
                    return Self::complete_flush(inner, flushed);
                }

                if !inner.flush_in_flight.load(Ordering::SeqCst) {
                    inner.flush_in_flight.store(true, Ordering::SeqCst);
                    respawn = tables.immutable.clone();
                }
            }

            if let Some(sealed) = respawn {
                Self::spawn_flush(inner, sealed);
            }

            Self::wait_for_flush_slot(inner, deadline)?;
        }
    }

    /// Block until the immutable slot clears or the deadline passes
    fn wait_for_flush_slot(inner: &Arc<Self>, deadline: Instant) -> Result<()> {
        let mut gate = inner.flush_gate.lock();
        if inner.tables.read().immutable.is_some() {
            if Instant::now() >= deadline
                || inner.flush_done.wait_until(&mut gate, deadline).timed_out()
            {
                return Err(EmberError::StillFlushing);
            }
        }
        Ok(())
    }

    /// Spawn the background flush for a sealed table. The caller has
    /// already claimed the in-flight flag; every exit path from the
    /// flush releases it through `notify_flush_done`.
    fn spawn_flush(inner: &Arc<Self>, memtable: Arc<MemTable>) {
        if inner.shutting_down.load(Ordering::SeqCst) {
            // close() drains the slot itself
            inner.notify_flush_done();
            return;
        }

        let task_inner = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name("emberkv-flush".to_string())
            .spawn(move || {
                let flushed = task_inner.storage.flush(&memtable);
                if let Err(e) = Self::complete_flush(&task_inner, flushed) {
                    error!(error = %e, "memtable flush failed, immutable memtable kept for retry");
                }
            });

        match spawned {
            Ok(handle) => inner.tasks.lock().push(handle),
            Err(e) => {
                inner.notify_flush_done();
                error!(error = %e, "failed to spawn flush thread");
            }
        }
    }

    /// Publish (or discard) the outcome of a flush and wake rotation
    /// waiters. On success the new table is prepended and the compaction
    /// decision is taken under the same exclusive lock; on failure the
    /// immutable slot keeps its table so no committed write is lost.
    fn complete_flush(inner: &Arc<Self>, flushed: Result<Arc<SSTableReader>>) -> Result<()> {
        match flushed {
            Ok(reader) => {
                let job = {
                    let mut tables = inner.tables.write();
                    let job = inner
                        .storage
                        .publish(reader, inner.config.compaction_threshold);
                    tables.immutable = None;
                    job
                };
                inner.notify_flush_done();

                if let Some(job) = job {
                    Self::spawn_compaction(inner, job);
                }
                Ok(())
            }
            Err(EmberError::EmptyFlush) => {
                // Nothing to write; just release the slot.
                inner.tables.write().immutable = None;
                inner.notify_flush_done();
                Ok(())
            }
            Err(e) => {
                inner.notify_flush_done();
                Err(e)
            }
        }
    }

    fn spawn_compaction(inner: &Arc<Self>, job: CompactionJob) {
        if inner.shutting_down.load(Ordering::SeqCst) {
            inner.storage.end_compaction();
            return;
        }

        let task_inner = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name("emberkv-compact".to_string())
            .spawn(move || task_inner.run_compaction(job));

        match spawned {
            Ok(handle) => inner.tasks.lock().push(handle),
            Err(e) => {
                inner.storage.end_compaction();
                error!(error = %e, "failed to spawn compaction thread");
            }
        }
    }

    fn run_compaction(self: Arc<Self>, job: CompactionJob) {
        let output_path = self.storage.sstable_path(job.output_id);

        match compaction::compact_sstables(&job.inputs, &output_path) {
            Ok(merged) => {
                self.storage.swap_compacted(&job.inputs, merged.map(Arc::new));
            }
            Err(e) => {
                error!(error = %e, "compaction failed, inputs left untouched");
                let _ = std::fs::remove_file(&output_path);
            }
        }

        self.storage.end_compaction();
    }

    /// Flush one table during shutdown; compaction is not scheduled.
    /// Returns false if the data could not be written (the WAL must then
    /// be kept).
    fn flush_on_close(&self, memtable: &MemTable) -> bool {
        match self.storage.flush(memtable) {
            Ok(reader) => {
                self.storage.publish(reader, usize::MAX);
                true
            }
            Err(EmberError::EmptyFlush) => true,
            Err(e) => {
                error!(error = %e, "close-time flush failed");
                false
            }
        }
    }

    fn notify_flush_done(&self) {
        self.flush_in_flight.store(false, Ordering::SeqCst);
        let _gate = self.flush_gate.lock();
        self.flush_done.notify_all();
    }
}

fn live_value(hit: Lookup) -> Option<Vec<u8>> {
    match hit {
        Lookup::Value(value) => Some(value),
        Lookup::Tombstone => None,
    }
}

/// Keys are non-empty and, like values, must fit the WAL's line format.
fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(EmberError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    if key.iter().any(|&b| matches!(b, b'|' | b'\r' | b'\n')) {
        return Err(EmberError::InvalidArgument(
            "key must not contain '|' or newline".to_string(),
        ));
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> Result<()> {
    if value.iter().any(|&b| matches!(b, b'|' | b'\r' | b'\n')) {
        return Err(EmberError::InvalidArgument(
            "value must not contain '|' or newline".to_string(),
        ));
    }
    Ok(())
}
