use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicI64 as AtomicTs, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};
use crate::segment::{Reader, SegmentWriter};
use crate::storage::StorageBackend;

/// A second-tier shard: one position in a primary shard's append-only list
/// of segment writers. Only the last one is ever written to; earlier ones
/// become read-only the moment a new one is appended (spec §3 invariant).
pub struct SecondShard {
    pub id: i64,
    writer_slot: Mutex<Option<Arc<SegmentWriter>>>,
    doc_time_min: AtomicTs,
    doc_time_max: AtomicTs,
}

impl SecondShard {
    fn new(id: i64, doc_time_min: i64, doc_time_max: i64) -> Self {
        SecondShard {
            id,
            writer_slot: Mutex::new(None),
            doc_time_min: AtomicTs::new(doc_time_min),
            doc_time_max: AtomicTs::new(doc_time_max),
        }
    }

    fn time_range(&self) -> (i64, i64) {
        (self.doc_time_min.load(Ordering::Acquire), self.doc_time_max.load(Ordering::Acquire))
    }
}

/// Owns a WAL plus an ordered list of second-tier shards for one
/// `hash(docID) mod N` bucket. Exclusive lock for the rollover critical
/// section; hot-path readers only ever take the shared lock.
pub struct PrimaryShard {
    pub id: i64,
    index_name: String,
    storage: Arc<dyn StorageBackend>,
    read_parallelism: usize,

    shard_num: AtomicI64,
    shards: RwLock<Vec<Arc<SecondShard>>>,
    wal: Mutex<Option<crate::wal::Wal>>,

    doc_time_min: AtomicTs,
    doc_time_max: AtomicTs,
}

impl PrimaryShard {
    pub fn new(id: i64, index_name: &str, storage: Arc<dyn StorageBackend>, read_parallelism: usize) -> Self {
        PrimaryShard {
            id,
            index_name: index_name.to_string(),
            storage,
            read_parallelism,
            shard_num: AtomicI64::new(1),
            shards: RwLock::new(vec![Arc::new(SecondShard::new(0, 0, 0))]),
            wal: Mutex::new(None),
            doc_time_min: AtomicTs::new(0),
            doc_time_max: AtomicTs::new(0),
        }
    }

    fn wal_dir(&self) -> PathBuf {
        self.storage.wal_dir(&self.index_name, self.id)
    }

    fn segment_dir(&self, second_id: i64) -> PathBuf {
        self.storage.segment_dir(&self.index_name, self.id, second_id)
    }

    /// Idempotent: ensures the WAL is ready for appends.
    pub fn open_wal(&self) -> Result<()> {
        let mut guard = self.wal.lock();
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(crate::wal::Wal::open(&self.wal_dir())?);
        Ok(())
    }

    pub fn append_wal(&self, record: &[u8]) -> Result<()> {
        self.open_wal()?;
        let mut guard = self.wal.lock();
        guard.as_mut().expect("wal opened above").append(record)
    }

    pub fn wal_size(&self) -> u64 {
        self.wal.lock().as_ref().map(|w| w.size()).unwrap_or(0)
    }

    pub fn latest_second_id(&self) -> i64 {
        self.shard_num.load(Ordering::Acquire) - 1
    }

    fn shard_num(&self) -> i64 {
        self.shard_num.load(Ordering::Acquire)
    }

    fn thread_pool(&self) -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(self.read_parallelism.max(1)).build().expect("thread pool")
    }

    fn open_writer(&self, second: &Arc<SecondShard>) -> Result<Arc<SegmentWriter>> {
        let mut slot = second.writer_slot.lock();
        if let Some(w) = slot.as_ref() {
            return Ok(w.clone());
        }
        let writer = Arc::new(SegmentWriter::open(self.storage.clone(), self.segment_dir(second.id))?);
        *slot = Some(writer.clone());
        Ok(writer)
    }

    /// Returns the writer for `id` (default: latest).
    pub fn get_writer(&self, id: Option<i64>) -> Result<Arc<SegmentWriter>> {
        let id = id.unwrap_or_else(|| self.latest_second_id());
        if id < 0 || id >= self.shard_num() {
            return Err(Error::runtime(format!("second shard {id} not found")));
        }
        let second = {
            let shards = self.shards.read();
            shards[id as usize].clone()
        };
        self.open_writer(&second)
    }

    /// One writer per second-tier shard, ascending.
    pub fn get_writers(&self) -> Result<Vec<Arc<SegmentWriter>>> {
        let n = self.shard_num();
        (0..n).map(|id| self.get_writer(Some(id))).collect()
    }

    /// Readers for every second-tier shard whose time range overlaps
    /// `[time_min, time_max]`, newest first, fanned out across a bounded
    /// thread pool. A shard strictly older than `time_min` ends the walk —
    /// rollover produces monotonically older shards further back in the
    /// list, per the Design Note on this optimization's assumption.
    pub fn get_readers(&self, time_min: i64, time_max: i64) -> Vec<Reader> {
        let shards: Vec<Arc<SecondShard>> = {
            let guard = self.shards.read();
            (0..guard.len()).rev().map(|i| guard[i].clone()).collect()
        };

        let mut selected = Vec::new();
        for second in shards {
            let (s_min, s_max) = second.time_range();
            if time_min > 0 && s_max > 0 && s_max < time_min {
                break;
            }
            if time_max > 0 && s_min > 0 && s_min > time_max {
                continue;
            }
            selected.push(second);
        }

        let pool = self.thread_pool();
        pool.install(|| {
            use rayon::prelude::*;
            selected
                .par_iter()
                .filter_map(|second| match self.open_writer(second) {
                    Ok(writer) => Some(writer.reader()),
                    Err(err) => {
                        tracing::error!(index = %self.index_name, shard = self.id, second = second.id, %err, "failed to open reader");
                        None
                    }
                })
                .collect()
        })
    }

    /// Searches second-tier shards newest-first for a document whose `_id`
    /// matches, fanning out with a cooperative cancel token: the first
    /// worker to find the id flips the flag and every other worker skips
    /// its remaining work instead of continuing to search (spec §9).
    pub fn find_shard_by_doc_id(&self, doc_id: &str) -> Result<i64> {
        let writers = self.get_writers()?;
        let found = AtomicI64::new(-1);
        let cancelled = AtomicBool::new(false);

        let pool = self.thread_pool();
        pool.install(|| {
            use rayon::prelude::*;
            (0..writers.len() as i64).into_par_iter().rev().for_each(|id| {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                let reader = writers[id as usize].reader();
                if reader.contains_id(doc_id) {
                    found.store(id, Ordering::Release);
                    cancelled.store(true, Ordering::Release);
                }
            });
        });

        let id = found.load(Ordering::Acquire);
        if id < 0 {
            Err(Error::id_not_found(doc_id))
        } else {
            Ok(id)
        }
    }

    /// Atomically creates a new second-tier shard, carrying the retiring
    /// shard's observed timestamp range and resetting the primary's
    /// running stats to zero. Rollover is serialized with WAL apply by
    /// virtue of taking the exclusive `shards` lock for the whole
    /// critical section.
    pub fn new_second_shard(&self) -> Result<()> {
        let mut shards = self.shards.write();
        let retiring_min = self.doc_time_min.swap(0, Ordering::AcqRel);
        let retiring_max = self.doc_time_max.swap(0, Ordering::AcqRel);

        let latest = shards.last().expect("at least one second shard always exists");
        latest.doc_time_min.store(retiring_min, Ordering::Release);
        latest.doc_time_max.store(retiring_max, Ordering::Release);

        let new_id = self.shard_num.fetch_add(1, Ordering::AcqRel);
        let new_second = Arc::new(SecondShard::new(new_id, 0, 0));
        shards.push(new_second.clone());
        drop(shards);

        tracing::info!(index = %self.index_name, shard = self.id, second = new_id, "rolled over to new second-tier shard");
        self.open_writer(&new_second)?;
        Ok(())
    }

    /// If the current writer's on-disk size exceeds `max_size`, rolls over.
    /// Deterministic on the boundary: trigger on `>`, not `>=`.
    pub fn check_rollover(&self, max_size: u64) -> Result<()> {
        let writer = self.get_writer(None)?;
        let (_, bytes) = writer.directory_stats()?;
        if bytes > max_size {
            self.new_second_shard()?;
        }
        Ok(())
    }

    pub fn set_timestamp(&self, ts: i64) {
        loop {
            let current_min = self.doc_time_min.load(Ordering::Acquire);
            if current_min == 0 {
                if self
                    .doc_time_min
                    .compare_exchange(0, ts, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.doc_time_max.store(ts, Ordering::Release);
                }
                break;
            }
            if ts < current_min {
                if self
                    .doc_time_min
                    .compare_exchange(current_min, ts, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            } else {
                let current_max = self.doc_time_max.load(Ordering::Acquire);
                if ts > current_max {
                    self.doc_time_max.compare_exchange(current_max, ts, Ordering::AcqRel, Ordering::Acquire).ok();
                }
                break;
            }
        }
    }

    pub fn timestamp_range(&self) -> (i64, i64) {
        (self.doc_time_min.load(Ordering::Acquire), self.doc_time_max.load(Ordering::Acquire))
    }

    pub fn close(&self) -> Result<()> {
        for second in self.shards.read().iter() {
            if let Some(writer) = second.writer_slot.lock().take() {
                writer.close()?;
            }
        }
        if let Some(mut wal) = self.wal.lock().take() {
            wal.close()?;
        }
        Ok(())
    }
}
