//! Core data types used throughout the query pipeline
//!
//! This module defines the fundamental data structures shared by storage,
//! the cursor pipeline and the query orchestrator:
//!
//! # Key Types
//!
//! - **`Sample`**: One pre-aggregated measurement for a fixed-width time bucket
//! - **`SampleBlock`**: A stored slab of consecutive samples for one source
//! - **`Resolution`**: A storage granularity (native sample and slab duration)
//! - **`DataPoint`**: One output point of a query (timestamp + value)
//!
//! # Example
//!
//! ```rust
//! use rollup_tsdb::types::{Resolution, Sample, SampleBlock};
//!
//! let resolution = Resolution::TenSeconds;
//! let block = SampleBlock::new(
//!     0,
//!     resolution.sample_duration_nanos(),
//!     vec![Sample::single(0, 1.0), Sample::single(1, 2.0)],
//! );
//! assert_eq!(block.samples.len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds in one second, used for derivative unit conversion
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// One pre-aggregated measurement covering a fixed-width time bucket
///
/// The offset is relative to the start timestamp of the owning block and is
/// expressed in multiples of the block's sample duration. The summary
/// statistics are sufficient to derive average, sum, minimum and maximum
/// without re-reading raw measurements.
///
/// # Memory Layout
///
/// ```text
/// |--offset(4)--|--count(4)--|--sum(8)--|--max(16)--|--min(16)--|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Offset in sample periods from the owning block's start timestamp
    pub offset: i32,

    /// Number of raw measurements folded into this sample
    pub count: u32,

    /// Sum of all raw measurements
    pub sum: f64,

    /// Largest raw measurement, absent when the sample holds one measurement
    pub max: Option<f64>,

    /// Smallest raw measurement, absent when the sample holds one measurement
    pub min: Option<f64>,
}

impl Sample {
    /// Create a sample from a single measurement
    pub fn single(offset: i32, value: f64) -> Self {
        Self {
            offset,
            count: 1,
            sum: value,
            max: None,
            min: None,
        }
    }

    /// Create a sample summarizing several measurements
    pub fn summary(offset: i32, count: u32, sum: f64, max: f64, min: f64) -> Self {
        Self {
            offset,
            count,
            sum,
            max: Some(max),
            min: Some(min),
        }
    }

    /// Mean of the folded measurements
    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Sum of the folded measurements
    pub fn summation(&self) -> f64 {
        self.sum
    }

    /// Largest folded measurement; falls back to the sum for single measurements
    pub fn maximum(&self) -> f64 {
        self.max.unwrap_or(self.sum)
    }

    /// Smallest folded measurement; falls back to the sum for single measurements
    pub fn minimum(&self) -> f64 {
        self.min.unwrap_or(self.sum)
    }
}

/// An ordered slab of samples for one source at one resolution
///
/// All samples share the block's start timestamp and sample duration. Offsets
/// are strictly increasing and relative to `start_timestamp_nanos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBlock {
    /// Start timestamp of the block in nanoseconds since epoch
    pub start_timestamp_nanos: i64,

    /// Duration of each sample in nanoseconds
    pub sample_duration_nanos: i64,

    /// Samples in strictly increasing offset order
    pub samples: Vec<Sample>,
}

impl SampleBlock {
    /// Create a block from its parts
    pub fn new(start_timestamp_nanos: i64, sample_duration_nanos: i64, samples: Vec<Sample>) -> Self {
        Self {
            start_timestamp_nanos,
            sample_duration_nanos,
            samples,
        }
    }

    /// Returns true if the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Storage granularity of rolled-up data
///
/// Each resolution defines the duration of a single sample and the duration of
/// a slab, which is the timespan covered by one stored [`SampleBlock`].
///
/// # Example
///
/// ```rust
/// use rollup_tsdb::types::Resolution;
///
/// let r = Resolution::TenSeconds;
/// assert_eq!(r.samples_per_slab(), 360);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 10 second samples stored in one hour slabs
    TenSeconds,
    /// 30 minute samples stored in one day slabs
    ThirtyMinutes,
}

impl Resolution {
    /// Stable identifier used in storage keys
    pub fn id(self) -> u8 {
        match self {
            Resolution::TenSeconds => 1,
            Resolution::ThirtyMinutes => 2,
        }
    }

    /// Look up a resolution by its storage key identifier
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Resolution::TenSeconds),
            2 => Some(Resolution::ThirtyMinutes),
            _ => None,
        }
    }

    /// Native duration of one sample in nanoseconds
    pub fn sample_duration_nanos(self) -> i64 {
        match self {
            Resolution::TenSeconds => 10 * NANOS_PER_SECOND,
            Resolution::ThirtyMinutes => 30 * 60 * NANOS_PER_SECOND,
        }
    }

    /// Duration covered by one stored block in nanoseconds
    pub fn slab_duration_nanos(self) -> i64 {
        match self {
            Resolution::TenSeconds => 60 * 60 * NANOS_PER_SECOND,
            Resolution::ThirtyMinutes => 24 * 60 * 60 * NANOS_PER_SECOND,
        }
    }

    /// Number of samples in a completely full slab
    pub fn samples_per_slab(self) -> i64 {
        self.slab_duration_nanos() / self.sample_duration_nanos()
    }

    /// Floor a timestamp to the start of the slab containing it
    pub fn slab_start(self, timestamp_nanos: i64) -> i64 {
        let slab = self.slab_duration_nanos();
        timestamp_nanos - timestamp_nanos.rem_euclid(slab)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::TenSeconds => write!(f, "10s"),
            Resolution::ThirtyMinutes => write!(f, "30m"),
        }
    }
}

/// A single output point of a query
///
/// The timestamp sits in the middle of the sample period the value
/// represents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Timestamp in nanoseconds since epoch
    pub timestamp_nanos: i64,

    /// Aggregated value (or per-second rate for derivative queries)
    pub value: f64,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(timestamp_nanos: i64, value: f64) -> Self {
        Self {
            timestamp_nanos,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_accessors_fall_back_to_sum() {
        let s = Sample::single(3, 7.5);
        assert_eq!(s.average(), 7.5);
        assert_eq!(s.summation(), 7.5);
        assert_eq!(s.maximum(), 7.5);
        assert_eq!(s.minimum(), 7.5);
    }

    #[test]
    fn test_sample_summary() {
        let s = Sample::summary(0, 4, 20.0, 9.0, 1.0);
        assert_eq!(s.average(), 5.0);
        assert_eq!(s.maximum(), 9.0);
        assert_eq!(s.minimum(), 1.0);
    }

    #[test]
    fn test_resolution_ids_roundtrip() {
        for r in [Resolution::TenSeconds, Resolution::ThirtyMinutes] {
            assert_eq!(Resolution::from_id(r.id()), Some(r));
        }
        assert_eq!(Resolution::from_id(0), None);
    }

    #[test]
    fn test_slab_start_floors_negative_timestamps() {
        let r = Resolution::TenSeconds;
        let slab = r.slab_duration_nanos();
        assert_eq!(r.slab_start(slab + 5), slab);
        assert_eq!(r.slab_start(-5), -slab);
        assert_eq!(r.slab_start(0), 0);
    }
}
