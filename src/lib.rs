//! Rollup TSDB - memory-bounded range queries over rollup time series
//!
//! This library reads per-source sample blocks stored at one of several
//! resolutions and answers range queries with:
//! - Downsampling to any multiple of the stored sample duration
//! - Linear interpolation across gaps, with an optional gap limit
//! - Rate-of-change (derivative) output
//! - Cross-source aggregation that holds back incomplete leading-edge points
//! - Memory accounting, with long ranges split into sequential passes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod memory;
pub mod storage;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Range query pipeline: spans, cursors, merge, planner and executor
pub mod query;

// Re-export main types
pub use config::Config;
pub use engine::{InMemorySampleStore, SampleStore};
pub use error::{Error, Result};
pub use memory::{BoundAccount, MemoryMonitor};
pub use query::{QueryExecutor, QueryOptions, QueryRequest, QueryResponse};
pub use types::{DataPoint, Resolution, Sample, SampleBlock};
