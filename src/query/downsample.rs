//! Downsampling cursor
//!
//! Groups consecutive raw offsets into coarser buckets. With a sample factor
//! of `f`, coarse offset `k` covers raw offsets `k*f .. (k+1)*f`. Bucket
//! boundaries use floor division, so negative offsets (data before the span
//! origin) fall into the bucket below zero rather than into bucket zero.

use crate::query::cursor::{Extractor, RawCursor};
use crate::query::span::Span;
use crate::types::Sample;

// ============================================================================
// Downsampler
// ============================================================================

/// Reducer combining the raw samples of one coarse bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downsampler {
    /// Sum of the samples' sums
    Sum,
    /// Total sum divided by total measurement count
    Avg,
    /// Largest per-sample maximum
    Max,
    /// Smallest per-sample minimum
    Min,
}

impl Downsampler {
    /// Reduce a non-empty run of samples to one value
    pub fn reduce(self, samples: &[Sample]) -> f64 {
        debug_assert!(!samples.is_empty(), "reduce() called with no samples");
        match self {
            Downsampler::Sum => samples.iter().map(|s| s.sum).sum(),
            Downsampler::Avg => {
                let mut total = 0.0;
                let mut count: u64 = 0;
                for s in samples {
                    total += s.sum;
                    count += s.count as u64;
                }
                total / count as f64
            }
            Downsampler::Max => samples
                .iter()
                .map(Sample::maximum)
                .fold(f64::NEG_INFINITY, |acc, v| if v > acc { v } else { acc }),
            Downsampler::Min => samples
                .iter()
                .map(Sample::minimum)
                .fold(f64::INFINITY, |acc, v| if v < acc { v } else { acc }),
        }
    }
}

// ============================================================================
// DownsamplingCursor
// ============================================================================

/// Cursor over coarse buckets of a span
///
/// When the sample factor is 1 every call passes straight through to one
/// [`RawCursor`]; otherwise `start` points at the first raw sample of the
/// current bucket and `end` at the first raw sample of the next one.
#[derive(Debug, Clone, Copy)]
pub struct DownsamplingCursor<'a> {
    sample_nanos: i64,
    factor: i32,
    start: RawCursor<'a>,
    end: RawCursor<'a>,
    downsampler: Downsampler,
}

impl<'a> DownsamplingCursor<'a> {
    /// Position a cursor on the first bucket at or after coarse `offset`
    /// that holds real data
    ///
    /// `sample_nanos` must be a positive multiple of the span's sample
    /// duration.
    pub fn seek(
        span: &'a Span,
        offset: i32,
        sample_nanos: i64,
        extractor: Extractor,
        downsampler: Downsampler,
    ) -> Self {
        debug_assert!(
            sample_nanos > 0 && sample_nanos % span.sample_nanos() == 0,
            "sample duration {} is not a multiple of span sample duration {}",
            sample_nanos,
            span.sample_nanos()
        );
        let factor = (sample_nanos / span.sample_nanos()) as i32;

        if factor == 1 {
            let start = RawCursor::seek(span, offset, extractor);
            return Self {
                sample_nanos,
                factor,
                start,
                end: start,
                downsampler,
            };
        }

        let start = RawCursor::seek(span, offset.saturating_mul(factor), extractor);
        let mut cursor = Self {
            sample_nanos,
            factor,
            start,
            end: start,
            downsampler,
        };
        cursor.compute_end();
        cursor
    }

    /// Returns true if the cursor points at a bucket holding real data
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.start.is_valid()
    }

    /// Coarse offset of the current bucket
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn offset(&self) -> i32 {
        self.start.offset().div_euclid(self.factor)
    }

    /// Start timestamp of the current bucket
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.start.span().start_nanos() + self.offset() as i64 * self.sample_nanos
    }

    /// Coarse sample duration
    #[inline]
    pub fn sample_nanos(&self) -> i64 {
        self.sample_nanos
    }

    /// Number of raw offsets per coarse bucket
    #[inline]
    pub fn factor(&self) -> i32 {
        self.factor
    }

    /// Span this cursor walks
    #[inline]
    pub fn span(&self) -> &'a Span {
        self.start.span()
    }

    /// Reduced value of the current bucket
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    pub fn value(&self) -> f64 {
        if self.factor == 1 {
            return self.start.value();
        }

        let mut samples = Vec::with_capacity(self.factor as usize);
        let mut cursor = self.start;
        while cursor.is_valid() && (!self.end.is_valid() || cursor.offset() != self.end.offset()) {
            samples.push(*cursor.sample());
            cursor.advance();
        }
        debug_assert!(!samples.is_empty(), "value() called on invalid cursor");
        if samples.is_empty() {
            // Reading the invalid start panics with an index error
            return self.start.value();
        }
        self.downsampler.reduce(&samples)
    }

    /// Move to the next bucket holding real data
    pub fn advance(&mut self) {
        if self.factor == 1 {
            self.start.advance();
            return;
        }

        self.start = self.end;
        if self.start.is_valid() {
            self.compute_end();
        }
    }

    /// Move to the previous bucket holding real data
    pub fn retreat(&mut self) {
        if self.factor == 1 {
            self.start.retreat();
            return;
        }

        self.end = self.start;
        self.start.retreat();
        if self.start.is_valid() {
            let bucket_start = self.start.offset().div_euclid(self.factor) * self.factor;
            self.start = RawCursor::seek(self.start.span(), bucket_start, self.start.extractor());
        }
    }

    fn compute_end(&mut self) {
        if !self.start.is_valid() {
            return;
        }
        let end_offset = (self.offset() + 1).saturating_mul(self.factor);
        self.end = RawCursor::seek(self.start.span(), end_offset, self.start.extractor());
    }
}
