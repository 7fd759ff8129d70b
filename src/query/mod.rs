//! Range query engine over rollup samples
//!
//! This module answers "what did metric M look like between T1 and T2,
//! aggregated across its sources" from per-source sample blocks:
//!
//! ```text
//!   SampleStore blocks
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Span       │  per-source blocks on a common origin
//! └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   RawCursor     │  one stored sample at a time
//! └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Downsampling    │  buckets of `factor` native samples
//! └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Interpolating   │  fills gaps, optional derivative
//! └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ AggregatingMerge│  lock-step across sources + leading edge
//! └─────────────────┘
//!          │
//!          ▼
//!   QueryResponse
//! ```
//!
//! [`QueryExecutor`] drives the pipeline and, when a [`planner`] budget
//! requires it, splits long ranges into sequential passes.
//!
//! # Example
//!
//! ```rust
//! use rollup_tsdb::query::{Aggregator, QueryOptions, QueryRequest};
//! use rollup_tsdb::types::Resolution;
//!
//! let request = QueryRequest::new("disk.iops")
//!     .with_downsampler(Aggregator::Max)
//!     .with_source_aggregator(Aggregator::Sum);
//!
//! let options = QueryOptions::new(Resolution::TenSeconds, 0, 3_600_000_000_000)
//!     .with_sample_duration(60_000_000_000);
//! assert!(options.validate().is_ok());
//! assert_eq!(request.name, "disk.iops");
//! ```

pub mod cursor;
pub mod downsample;
pub mod error;
pub mod executor;
pub mod interpolate;
pub mod merge;
pub mod planner;
pub mod request;
pub mod result;
pub mod span;

pub use cursor::{Extractor, RawCursor};
pub use downsample::{Downsampler, DownsamplingCursor};
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use executor::{
    ExecutionContext, ExecutionStats, ExecutionStatsSnapshot, ExecutorConfig, QueryExecutor,
};
pub use interpolate::{Derivative, InterpolatingCursor};
pub use merge::{AggregatingMerge, CursorHeap, LeadingEdgeFilter};
pub use request::{Aggregator, QueryOptions, QueryRequest};
pub use result::{QueryResponse, ResponseAccumulator};
pub use span::{CalibratedBlock, Span};
