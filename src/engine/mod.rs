//! Pluggable storage engine seam for the query pipeline

/// In-memory implementations for tests and benchmarks
pub mod stubs;
pub mod traits;

pub use stubs::InMemorySampleStore;
pub use traits::{KeyValue, SampleStore, StoreStats};
