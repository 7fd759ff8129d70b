//! Memory accounting for query execution
//!
//! A [`MemoryMonitor`] is a named byte pool shared by every query running
//! against it. Each query reserves bytes through one or more
//! [`BoundAccount`]s; growth that would push the pool past its limit is
//! rejected, and an account hands its bytes back to the pool when it is
//! closed or dropped.
//!
//! # Example
//!
//! ```rust
//! use rollup_tsdb::memory::MemoryMonitor;
//! use std::sync::Arc;
//!
//! let monitor = Arc::new(MemoryMonitor::new("query-worker", 1024));
//! let mut account = monitor.make_account();
//! account.grow(512).unwrap();
//! assert_eq!(monitor.allocated(), 512);
//! drop(account);
//! assert_eq!(monitor.allocated(), 0);
//! ```

use crate::query::error::{QueryError, QueryResult};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Named pool of bytes with an upper limit
#[derive(Debug)]
pub struct MemoryMonitor {
    name: String,
    limit: i64,
    allocated: AtomicI64,
    high_water: AtomicI64,
    rejections: AtomicU64,
}

impl MemoryMonitor {
    /// Create a monitor that refuses allocations beyond `limit` bytes
    pub fn new(name: impl Into<String>, limit: i64) -> Self {
        Self {
            name: name.into(),
            limit,
            allocated: AtomicI64::new(0),
            high_water: AtomicI64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Create a monitor without a limit
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, i64::MAX)
    }

    /// Open a new, empty account against this monitor
    pub fn make_account(self: &Arc<Self>) -> BoundAccount {
        BoundAccount {
            monitor: Arc::clone(self),
            used: 0,
        }
    }

    /// Monitor name, used in error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured limit in bytes
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Bytes currently reserved by all open accounts
    pub fn allocated(&self) -> i64 {
        self.allocated.load(Ordering::Acquire)
    }

    /// Largest number of bytes ever reserved at once
    pub fn high_water(&self) -> i64 {
        self.high_water.load(Ordering::Relaxed)
    }

    /// Number of reservations refused so far
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    fn reserve(&self, bytes: i64) -> QueryResult<()> {
        let reserved = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(bytes)?;
                if next > self.limit {
                    None
                } else {
                    Some(next)
                }
            });

        match reserved {
            Ok(previous) => {
                self.high_water
                    .fetch_max(previous + bytes, Ordering::Relaxed);
                Ok(())
            }
            Err(current) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                Err(QueryError::resource_limit(format!(
                    "{}: memory budget exceeded: {} bytes requested, {} in use, limit {}",
                    self.name, bytes, current, self.limit
                )))
            }
        }
    }

    fn release(&self, bytes: i64) {
        let _ = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes).max(0))
            });
    }
}

/// A single owner's reservation against a [`MemoryMonitor`]
///
/// Dropping the account returns every byte it still holds.
#[derive(Debug)]
pub struct BoundAccount {
    monitor: Arc<MemoryMonitor>,
    used: i64,
}

impl BoundAccount {
    /// Reserve `bytes` more from the monitor
    ///
    /// # Errors
    ///
    /// Returns a resource limit error if the monitor cannot satisfy the
    /// request; the account is left unchanged.
    pub fn grow(&mut self, bytes: i64) -> QueryResult<()> {
        if bytes <= 0 {
            return Ok(());
        }
        self.monitor.reserve(bytes)?;
        self.used += bytes;
        Ok(())
    }

    /// Give `bytes` back to the monitor
    pub fn shrink(&mut self, bytes: i64) {
        let bytes = bytes.clamp(0, self.used);
        self.monitor.release(bytes);
        self.used -= bytes;
    }

    /// Bytes currently held by this account
    pub fn used(&self) -> i64 {
        self.used
    }

    /// Release everything held by this account
    pub fn close(&mut self) {
        let used = self.used;
        self.shrink(used);
    }

    /// The monitor backing this account
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }
}

impl Drop for BoundAccount {
    fn drop(&mut self) {
        self.close();
    }
}
