//! Interpolating cursor
//!
//! Answers "what is the value at offset X" for every integer offset of a
//! span, not only the offsets holding real data. Missing offsets are filled
//! by linear interpolation between the nearest real buckets on either side,
//! unless the two are further apart than the configured maximum distance.

use crate::query::cursor::Extractor;
use crate::query::downsample::{DownsamplingCursor, Downsampler};
use crate::query::error::{QueryError, QueryResult};
use crate::query::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rate conversion applied to interpolated values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivative {
    /// Report values
    #[default]
    None,
    /// Report the slope between the bracketing real values
    Derivative,
    /// Like `Derivative`, but negative slopes are reported as zero
    NonNegativeDerivative,
}

impl Derivative {
    /// Returns true for either derivative mode
    pub fn is_derivative(self) -> bool {
        self != Derivative::None
    }
}

impl FromStr for Derivative {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Derivative::None),
            "derivative" => Ok(Derivative::Derivative),
            "non_negative_derivative" => Ok(Derivative::NonNegativeDerivative),
            other => Err(QueryError::validation(format!(
                "unknown derivative mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Derivative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Derivative::None => write!(f, "none"),
            Derivative::Derivative => write!(f, "derivative"),
            Derivative::NonNegativeDerivative => write!(f, "non_negative_derivative"),
        }
    }
}

/// Cursor yielding a value for every offset of a span
#[derive(Debug, Clone, Copy)]
pub struct InterpolatingCursor<'a> {
    offset: i32,
    max_distance: i32,
    next_real: DownsamplingCursor<'a>,
    prev_real: Option<DownsamplingCursor<'a>>,
    derivative: Derivative,
}

impl<'a> InterpolatingCursor<'a> {
    /// Create a cursor positioned at `start_offset`
    ///
    /// A `max_distance` of zero disables the gap limit.
    pub fn new(
        span: &'a Span,
        start_offset: i32,
        sample_nanos: i64,
        max_distance: i32,
        extractor: Extractor,
        downsampler: Downsampler,
        derivative: Derivative,
    ) -> Self {
        let next_real =
            DownsamplingCursor::seek(span, start_offset, sample_nanos, extractor, downsampler);

        let mut prev = next_real;
        prev.retreat();

        Self {
            offset: start_offset,
            max_distance,
            next_real,
            prev_real: prev.is_valid().then_some(prev),
            derivative,
        }
    }

    /// Move to `offset`, carrying the bracketing real buckets along
    pub fn advance_to(&mut self, offset: i32) {
        self.offset = offset;
        while self.next_real.is_valid() && self.next_real.offset() < self.offset {
            self.prev_real = Some(self.next_real);
            self.next_real.advance();
        }
    }

    /// Returns true while real data remains at or after the current offset
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.next_real.is_valid()
    }

    /// Current offset
    #[inline]
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// First real bucket at or after the current offset
    #[inline]
    pub fn next_real(&self) -> &DownsamplingCursor<'a> {
        &self.next_real
    }

    /// Timestamp at the middle of the current offset's sample period
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the cursor is invalid.
    pub fn mid_timestamp(&self) -> i64 {
        debug_assert!(self.is_valid(), "mid_timestamp() called on invalid cursor");
        let sample_nanos = self.next_real.sample_nanos();
        self.next_real.span().start_nanos() + self.offset as i64 * sample_nanos + sample_nanos / 2
    }

    /// Value (or derivative) at the current offset, `None` if it cannot be
    /// computed
    pub fn value(&self) -> Option<f64> {
        if !self.is_valid() {
            return None;
        }

        let is_derivative = self.derivative.is_derivative();
        if !is_derivative && self.next_real.offset() == self.offset {
            return Some(self.next_real.value());
        }

        let prev_real = self.prev_real.as_ref()?;

        let next_off = self.next_real.offset();
        let prev_off = prev_real.offset();
        if self.max_distance > 0 && next_off - prev_off > self.max_distance {
            return None;
        }

        let off = self.offset as f64;
        let next_val = self.next_real.value();
        let next_off = next_off as f64;
        let prev_val = prev_real.value();
        let prev_off = prev_off as f64;

        // Keep the two formulas separate; sharing the slope changes rounding
        // in the value case.
        if !is_derivative {
            return Some(prev_val + (next_val - prev_val) * (off - prev_off) / (next_off - prev_off));
        }

        let deriv = (next_val - prev_val) / (next_off - prev_off);
        if self.derivative == Derivative::NonNegativeDerivative && deriv < 0.0 {
            return Some(0.0);
        }
        Some(deriv)
    }
}
