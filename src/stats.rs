use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Aggregate stats for one `Index`: document count, WAL bytes, and the
/// min/max timestamp observed across all of its primary shards.
#[derive(Default)]
pub struct IndexStats {
    pub doc_count: AtomicU64,
    pub wal_size: AtomicU64,
    pub doc_time_min: AtomicI64,
    pub doc_time_max: AtomicI64,
}

impl IndexStats {
    pub fn record_document(&self, ts: i64) {
        self.doc_count.fetch_add(1, Ordering::AcqRel);
        loop {
            let min = self.doc_time_min.load(Ordering::Acquire);
            if min == 0 || ts < min {
                if self.doc_time_min.compare_exchange(min, ts, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    break;
                }
            } else {
                break;
            }
        }
        loop {
            let max = self.doc_time_max.load(Ordering::Acquire);
            if ts > max {
                if self.doc_time_max.compare_exchange(max, ts, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    break;
                }
            } else {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            doc_count: self.doc_count.load(Ordering::Acquire),
            wal_size: self.wal_size.load(Ordering::Acquire),
            doc_time_min: self.doc_time_min.load(Ordering::Acquire),
            doc_time_max: self.doc_time_max.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStatsSnapshot {
    pub doc_count: u64,
    pub wal_size: u64,
    pub doc_time_min: i64,
    pub doc_time_max: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_document_tracks_min_and_max_timestamp() {
        let stats = IndexStats::default();
        stats.record_document(500);
        stats.record_document(100);
        stats.record_document(900);
        let snap = stats.snapshot();
        assert_eq!(snap.doc_count, 3);
        assert_eq!(snap.doc_time_min, 100);
        assert_eq!(snap.doc_time_max, 900);
    }
}
