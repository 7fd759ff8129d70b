//! In-memory sample store
//!
//! [`InMemorySampleStore`] keeps encoded blocks in an ordered map. It is
//! intended for:
//! - **Unit testing** the query pipeline without an external store
//! - **Integration testing** with realistic encoded keys and values
//! - **Benchmarking** the cursor pipeline in isolation from IO
//!
//! # Warning
//!
//! The store loses all data when dropped and is **not** suitable for
//! production use.
//!
//! # Example
//!
//! ```rust
//! use rollup_tsdb::engine::stubs::InMemorySampleStore;
//! use rollup_tsdb::types::{Resolution, Sample, SampleBlock};
//!
//! let store = InMemorySampleStore::new();
//! let res = Resolution::TenSeconds;
//! store.put_block(
//!     "cpu.user",
//!     "node-1",
//!     res,
//!     &SampleBlock::new(0, res.sample_duration_nanos(), vec![Sample::single(0, 1.0)]),
//! );
//! assert_eq!(store.stats().total_keys, 1);
//! ```

use crate::engine::traits::{KeyRange, KeyValue, SampleStore, StoreStats};
use crate::error::StorageError;
use crate::storage::{encode_block, DataKey};
use crate::types::{Resolution, SampleBlock};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Ordered in-memory store of encoded sample blocks
pub struct InMemorySampleStore {
    /// Encoded key -> encoded block
    data: RwLock<BTreeMap<Bytes, Bytes>>,
    /// When set, every read fails with `StorageError::Unavailable`
    fail_reads: AtomicBool,
    /// Artificial latency added to every read
    read_delay: RwLock<Option<Duration>>,
    /// Statistics
    stats: StoreStatsAtomic,
}

struct StoreStatsAtomic {
    scan_ops: AtomicU64,
    get_ops: AtomicU64,
}

impl InMemorySampleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            fail_reads: AtomicBool::new(false),
            read_delay: RwLock::new(None),
            stats: StoreStatsAtomic {
                scan_ops: AtomicU64::new(0),
                get_ops: AtomicU64::new(0),
            },
        }
    }

    /// Store a raw key-value pair
    pub fn put(&self, key: Bytes, value: Bytes) {
        self.data.write().insert(key, value);
    }

    /// Encode and store a block for `(name, source, resolution)`
    ///
    /// The key's slab is derived from the block's start timestamp.
    pub fn put_block(&self, name: &str, source: &str, resolution: Resolution, block: &SampleBlock) {
        let key = DataKey::new(name, source, resolution, block.start_timestamp_nanos);
        self.put(key.encode(), encode_block(block));
    }

    /// Make every subsequent read fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent read by `delay`
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.write() = delay;
    }

    /// Total number of read calls (scans plus point-read batches)
    pub fn read_ops(&self) -> u64 {
        self.stats.scan_ops.load(Ordering::Relaxed) + self.stats.get_ops.load(Ordering::Relaxed)
    }

    /// Snapshot of store statistics
    pub fn stats(&self) -> StoreStats {
        let data = self.data.read();
        StoreStats {
            total_keys: data.len() as u64,
            total_bytes: data.values().map(|v| v.len() as u64).sum(),
            scan_ops: self.stats.scan_ops.load(Ordering::Relaxed),
            get_ops: self.stats.get_ops.load(Ordering::Relaxed),
        }
    }

    async fn before_read(&self) -> Result<(), StorageError> {
        let delay = *self.read_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store configured to fail reads".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleStore for InMemorySampleStore {
    fn store_id(&self) -> &str {
        "in-memory-v1"
    }

    async fn scan(&self, range: KeyRange) -> Result<Vec<KeyValue>, StorageError> {
        self.stats.scan_ops.fetch_add(1, Ordering::Relaxed);
        self.before_read().await?;

        if range.start > range.end {
            return Err(StorageError::InvalidRange(format!(
                "start {:?} is after end {:?}",
                range.start, range.end
            )));
        }

        let data = self.data.read();
        Ok(data
            .range(range.start..range.end)
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect())
    }

    async fn get_many(&self, keys: Vec<Bytes>) -> Result<Vec<Option<Bytes>>, StorageError> {
        self.stats.get_ops.fetch_add(1, Ordering::Relaxed);
        self.before_read().await?;

        let data = self.data.read();
        Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
    }
}
