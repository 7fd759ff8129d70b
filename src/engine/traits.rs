//! Core trait definitions for pluggable sample stores

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;

pub use crate::storage::key::KeyRange;

// =============================================================================
// SampleStore Trait
// =============================================================================

/// Read side of the key-value store holding encoded sample blocks
///
/// Implementations must return scan results in ascending key order. Both
/// operations may suspend; callers treat every call as a potential
/// cancellation point.
#[async_trait]
pub trait SampleStore: Send + Sync + 'static {
    /// Unique identifier for this store backend
    fn store_id(&self) -> &str;

    /// Return every key-value pair inside `range`, ordered by key
    async fn scan(&self, range: KeyRange) -> Result<Vec<KeyValue>, StorageError>;

    /// Batched point reads; the result has one entry per requested key, in
    /// request order, with `None` for keys that do not exist
    async fn get_many(&self, keys: Vec<Bytes>) -> Result<Vec<Option<Bytes>>, StorageError>;
}

/// A single stored key-value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Encoded [`DataKey`](crate::storage::DataKey)
    pub key: Bytes,
    /// Encoded sample block
    pub value: Bytes,
}

impl KeyValue {
    /// Create a new pair
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Store statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored keys
    pub total_keys: u64,
    /// Total size of stored values in bytes
    pub total_bytes: u64,
    /// Number of scan calls served
    pub scan_ops: u64,
    /// Number of keys requested through point reads
    pub get_ops: u64,
}
