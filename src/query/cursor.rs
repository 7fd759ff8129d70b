//! Raw cursor over the real samples of a [`Span`]
//!
//! A [`RawCursor`] points at one real sample of a span and steps across
//! block boundaries in either direction. Cursors are small `Copy` values
//! borrowing the span, so cloning one to look ahead is free.
//!
//! # Validity
//!
//! An invalid cursor is in one of three states, told apart by its sample
//! index:
//!
//! - never valid (empty span): index 0 of no block, stepping has no effect
//! - past the last sample: index == block length, one `retreat()` lands on
//!   the last sample
//! - before the first sample: index == -1, one `advance()` lands on the
//!   first sample

use crate::query::span::Span;
use crate::types::Sample;

// ============================================================================
// Extractor
// ============================================================================

/// Scalar extracted from a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Mean of the sample's measurements
    Average,
    /// Sum of the sample's measurements
    Summation,
    /// Largest measurement
    Maximum,
    /// Smallest measurement
    Minimum,
}

impl Extractor {
    /// Apply the extractor to a sample
    #[inline]
    pub fn extract(self, sample: &Sample) -> f64 {
        match self {
            Extractor::Average => sample.average(),
            Extractor::Summation => sample.summation(),
            Extractor::Maximum => sample.maximum(),
            Extractor::Minimum => sample.minimum(),
        }
    }
}

// ============================================================================
// RawCursor
// ============================================================================

/// Positioned, seekable pointer into a span's real samples
#[derive(Debug, Clone, Copy)]
pub struct RawCursor<'a> {
    span: &'a Span,
    block_idx: usize,
    sample_idx: isize,
    valid: bool,
    extractor: Extractor,
}

impl<'a> RawCursor<'a> {
    /// Position a cursor on the first real sample whose offset is `>= offset`
    ///
    /// If every sample lies before `offset` the cursor is placed past the
    /// end; calling [`retreat`](Self::retreat) once then lands on the last
    /// sample. A cursor over an empty span is permanently invalid.
    pub fn seek(span: &'a Span, offset: i32, extractor: Extractor) -> Self {
        let blocks = span.blocks();
        if blocks.is_empty() {
            return Self {
                span,
                block_idx: 0,
                sample_idx: 0,
                valid: false,
                extractor,
            };
        }

        let block_idx = blocks.partition_point(|b| b.last_offset() < offset);
        if block_idx == blocks.len() {
            let last = blocks.len() - 1;
            return Self {
                span,
                block_idx: last,
                sample_idx: blocks[last].len() as isize,
                valid: false,
                extractor,
            };
        }

        let block = &blocks[block_idx];
        let samples = &block.block().samples;
        let adjustment = block.offset_adjustment();
        let sample_idx = samples.partition_point(|s| s.offset + adjustment < offset);

        Self {
            span,
            block_idx,
            sample_idx: sample_idx as isize,
            valid: true,
            extractor,
        }
    }

    /// Span this cursor walks
    #[inline]
    pub fn span(&self) -> &'a Span {
        self.span
    }

    /// Extractor used by [`value`](Self::value)
    #[inline]
    pub fn extractor(&self) -> Extractor {
        self.extractor
    }

    /// Returns true if the cursor points at a real sample
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Sample under the cursor
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn sample(&self) -> &'a Sample {
        debug_assert!(self.valid, "sample() called on invalid cursor: {:?}", self);
        let span: &'a Span = self.span;
        &span.blocks()[self.block_idx].block().samples[self.checked_sample_idx()]
    }

    /// Extracted scalar value of the sample under the cursor
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn value(&self) -> f64 {
        self.extractor.extract(self.sample())
    }

    /// Calibrated offset of the sample under the cursor
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn offset(&self) -> i32 {
        debug_assert!(self.valid, "offset() called on invalid cursor: {:?}", self);
        self.span.blocks()[self.block_idx].offset_at(self.checked_sample_idx())
    }

    /// Start timestamp of the sample period under the cursor
    ///
    /// # Panics
    ///
    /// Panics if the cursor is invalid.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.span.start_nanos() + self.offset() as i64 * self.span.sample_nanos()
    }

    /// Move to the next real sample
    pub fn advance(&mut self) {
        if !self.valid {
            if self.sample_idx < 0 {
                self.valid = true;
                self.sample_idx += 1;
            }
            return;
        }

        let blocks = self.span.blocks();
        if ((self.sample_idx + 1) as usize) < blocks[self.block_idx].len() {
            self.sample_idx += 1;
        } else if self.block_idx + 1 < blocks.len() {
            self.block_idx += 1;
            self.sample_idx = 0;
        } else {
            self.sample_idx += 1;
            self.valid = false;
        }
    }

    /// Move to the previous real sample
    pub fn retreat(&mut self) {
        if !self.valid {
            if self.sample_idx > 0 {
                self.valid = true;
                self.sample_idx -= 1;
            }
            return;
        }

        if self.sample_idx > 0 {
            self.sample_idx -= 1;
        } else if self.block_idx > 0 {
            self.block_idx -= 1;
            self.sample_idx = self.span.blocks()[self.block_idx].len() as isize - 1;
        } else {
            self.sample_idx -= 1;
            self.valid = false;
        }
    }

    // A negative index converts to a huge usize, so indexing with it panics
    // instead of reading a neighbouring sample.
    #[inline]
    fn checked_sample_idx(&self) -> usize {
        usize::try_from(self.sample_idx).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleBlock;

    /// Span with origin 0 and sample duration 10 holding three blocks
    fn test_span() -> Span {
        let mut span = Span::new(0, 10);
        for (start, offsets) in [(0, vec![1, 2, 5]), (100, vec![0, 3]), (200, vec![4])] {
            span.add_block(SampleBlock::new(
                start,
                10,
                offsets
                    .into_iter()
                    .map(|o| Sample::single(o, (start / 10 + o as i64) as f64))
                    .collect(),
            ))
            .unwrap();
        }
        span
    }

    const ALL_OFFSETS: [i32; 6] = [1, 2, 5, 10, 13, 24];

    #[test]
    fn test_forward_iteration_visits_every_sample() {
        let span = test_span();
        let mut cursor = RawCursor::seek(&span, i32::MIN, Extractor::Summation);
        let mut seen = Vec::new();
        while cursor.is_valid() {
            seen.push(cursor.offset());
            assert_eq!(cursor.value(), cursor.offset() as f64);
            assert_eq!(cursor.timestamp(), cursor.offset() as i64 * 10);
            cursor.advance();
        }
        assert_eq!(seen, ALL_OFFSETS);
    }

    #[test]
    fn test_backward_iteration_reverses_order() {
        let span = test_span();
        let mut cursor = RawCursor::seek(&span, i32::MAX, Extractor::Summation);
        assert!(!cursor.is_valid());
        cursor.retreat();

        let mut seen = Vec::new();
        while cursor.is_valid() {
            seen.push(cursor.offset());
            cursor.retreat();
        }
        seen.reverse();
        assert_eq!(seen, ALL_OFFSETS);

        // Stepping forward from before-first lands on the first sample
        cursor.advance();
        assert!(cursor.is_valid());
        assert_eq!(cursor.offset(), 1);
    }

    #[test]
    fn test_seek_lands_on_first_offset_at_or_after_target() {
        let span = test_span();
        let cases = [(0, 1), (1, 1), (3, 5), (6, 10), (11, 13), (14, 24), (24, 24)];
        for (target, expected) in cases {
            let cursor = RawCursor::seek(&span, target, Extractor::Summation);
            assert!(cursor.is_valid(), "seek({})", target);
            assert_eq!(cursor.offset(), expected, "seek({})", target);
        }
    }

    #[test]
    fn test_seek_past_end_then_retreat() {
        let span = test_span();
        let mut cursor = RawCursor::seek(&span, 25, Extractor::Summation);
        assert!(!cursor.is_valid());
        cursor.retreat();
        assert!(cursor.is_valid());
        assert_eq!(cursor.offset(), 24);
    }

    #[test]
    fn test_advance_past_end_then_retreat() {
        let span = test_span();
        let mut cursor = RawCursor::seek(&span, 24, Extractor::Summation);
        cursor.advance();
        assert!(!cursor.is_valid());
        cursor.retreat();
        assert_eq!(cursor.offset(), 24);
    }

    #[test]
    fn test_empty_span_is_permanently_invalid() {
        let span = Span::new(0, 10);
        let mut cursor = RawCursor::seek(&span, 0, Extractor::Average);
        assert!(!cursor.is_valid());
        cursor.advance();
        assert!(!cursor.is_valid());
        cursor.retreat();
        assert!(!cursor.is_valid());
    }

    #[test]
    fn test_extractors() {
        let s = Sample::summary(0, 4, 20.0, 9.0, 1.0);
        assert_eq!(Extractor::Average.extract(&s), 5.0);
        assert_eq!(Extractor::Summation.extract(&s), 20.0);
        assert_eq!(Extractor::Maximum.extract(&s), 9.0);
        assert_eq!(Extractor::Minimum.extract(&s), 1.0);
    }

    #[test]
    #[should_panic]
    fn test_value_on_invalid_cursor_panics() {
        let span = test_span();
        let cursor = RawCursor::seek(&span, 100, Extractor::Summation);
        cursor.value();
    }

    #[test]
    #[should_panic]
    fn test_offset_before_first_panics() {
        let span = test_span();
        let mut cursor = RawCursor::seek(&span, 0, Extractor::Summation);
        cursor.retreat();
        cursor.offset();
    }
}
