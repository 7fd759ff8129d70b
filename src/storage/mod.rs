//! Storage encodings for rolled-up time-series data
//!
//! Samples are stored as one block per (metric, source, resolution, slab).
//! This module defines how those blocks are addressed and serialized; the
//! key-value store holding them sits behind
//! [`SampleStore`](crate::engine::traits::SampleStore).
//!
//! # Key Components
//!
//! - **DataKey**: Ordered binary key for one stored block
//! - **KeyRange**: Half-open key range for ordered scans
//! - **Block codec**: Checksummed binary encoding of a [`SampleBlock`](crate::types::SampleBlock)
//!
//! # Example
//!
//! ```rust
//! use rollup_tsdb::storage::{decode_block, encode_block, DataKey};
//! use rollup_tsdb::types::{Resolution, Sample, SampleBlock};
//!
//! let key = DataKey::new("cpu.user", "node-1", Resolution::TenSeconds, 0);
//! let block = SampleBlock::new(0, 10_000_000_000, vec![Sample::single(0, 1.0)]);
//!
//! let value = encode_block(&block);
//! assert_eq!(DataKey::decode(&key.encode()).unwrap(), key);
//! assert_eq!(decode_block(&value).unwrap(), block);
//! ```

/// Checksummed sample block codec
pub mod block;
/// Ordered data key encoding
pub mod key;

pub use block::{decode_block, encode_block, BLOCK_FORMAT_VERSION};
pub use key::{DataKey, KeyRange, DATA_KEY_PREFIX};
