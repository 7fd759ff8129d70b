//! Property-based tests for the cursor pipeline
//!
//! Uses proptest to check cursor and merge invariants over randomly shaped
//! spans: arbitrary offsets, gaps and block boundaries.

use proptest::prelude::*;
use rollup_tsdb::query::{
    AggregatingMerge, Derivative, Downsampler, DownsamplingCursor, Extractor,
    InterpolatingCursor, RawCursor, Span,
};
use rollup_tsdb::types::{Sample, SampleBlock};
use std::collections::{BTreeMap, BTreeSet};

const SAMPLE_NANOS: i64 = 10;
const SAMPLES_PER_BLOCK: i32 = 50;

/// Build a span at origin 0 from `(offset, value)` pairs, split into blocks
/// of 50 sample periods
fn build_span(points: &BTreeMap<i32, f64>) -> Span {
    let mut blocks: BTreeMap<i32, Vec<Sample>> = BTreeMap::new();
    for (&offset, &value) in points {
        let block = offset.div_euclid(SAMPLES_PER_BLOCK);
        blocks
            .entry(block)
            .or_default()
            .push(Sample::single(offset - block * SAMPLES_PER_BLOCK, value));
    }

    let mut span = Span::new(0, SAMPLE_NANOS);
    for (block, samples) in blocks {
        let start = block as i64 * SAMPLES_PER_BLOCK as i64 * SAMPLE_NANOS;
        span.add_block(SampleBlock::new(start, SAMPLE_NANOS, samples))
            .expect("blocks are added in offset order");
    }
    span
}

fn points_strategy() -> impl Strategy<Value = BTreeMap<i32, f64>> {
    prop::collection::btree_map(0i32..300, -1000.0f64..1000.0, 1..80)
}

fn raw_offsets(mut cursor: RawCursor<'_>) -> Vec<i32> {
    let mut offsets = Vec::new();
    while cursor.is_valid() {
        offsets.push(cursor.offset());
        cursor.advance();
    }
    offsets
}

// =============================================================================
// Raw Cursor
// =============================================================================

mod raw_cursor {
    use super::*;

    proptest! {
        /// Advancing from the front visits every stored offset in order
        #[test]
        fn advance_visits_all_offsets(points in points_strategy()) {
            let span = build_span(&points);
            let cursor = RawCursor::seek(&span, i32::MIN, Extractor::Average);

            let expected: Vec<i32> = points.keys().copied().collect();
            prop_assert_eq!(raw_offsets(cursor), expected);
        }

        /// Retreating from past the end visits every offset in reverse
        #[test]
        fn retreat_reverses_advance(points in points_strategy()) {
            let span = build_span(&points);
            let mut cursor = RawCursor::seek(&span, i32::MAX, Extractor::Average);
            prop_assert!(!cursor.is_valid());

            let mut offsets = Vec::new();
            cursor.retreat();
            while cursor.is_valid() {
                offsets.push(cursor.offset());
                cursor.retreat();
            }

            let expected: Vec<i32> = points.keys().rev().copied().collect();
            prop_assert_eq!(offsets, expected);
        }

        /// Seek lands on the first offset at or after the target
        #[test]
        fn seek_finds_lower_bound(points in points_strategy(), target in -20i32..320) {
            let span = build_span(&points);
            let cursor = RawCursor::seek(&span, target, Extractor::Average);

            match points.range(target..).next() {
                Some((&offset, &value)) => {
                    prop_assert!(cursor.is_valid());
                    prop_assert_eq!(cursor.offset(), offset);
                    prop_assert_eq!(cursor.value(), value);
                }
                None => prop_assert!(!cursor.is_valid()),
            }
        }
    }
}

// =============================================================================
// Downsampling Cursor
// =============================================================================

mod downsampling_cursor {
    use super::*;

    proptest! {
        /// A factor of one behaves exactly like the raw cursor
        #[test]
        fn factor_one_is_identity(points in points_strategy()) {
            let span = build_span(&points);
            let raw = RawCursor::seek(&span, 0, Extractor::Average);
            let mut cursor = DownsamplingCursor::seek(
                &span, 0, SAMPLE_NANOS, Extractor::Average, Downsampler::Avg,
            );

            let mut visited = Vec::new();
            while cursor.is_valid() {
                visited.push((cursor.offset(), cursor.value()));
                cursor.advance();
            }

            let mut raw_visited = Vec::new();
            let mut raw = raw;
            while raw.is_valid() {
                raw_visited.push((raw.offset(), raw.value()));
                raw.advance();
            }
            prop_assert_eq!(visited, raw_visited);
        }

        /// Buckets are visited once each, in order, with summed values
        #[test]
        fn buckets_partition_samples(points in points_strategy(), factor in 2i64..12) {
            let span = build_span(&points);
            let mut cursor = DownsamplingCursor::seek(
                &span, 0, factor * SAMPLE_NANOS, Extractor::Summation, Downsampler::Sum,
            );

            let mut expected: BTreeMap<i32, f64> = BTreeMap::new();
            for (&offset, &value) in &points {
                *expected.entry(offset.div_euclid(factor as i32)).or_default() += value;
            }

            let mut visited = Vec::new();
            while cursor.is_valid() {
                visited.push((cursor.offset(), cursor.value()));
                cursor.advance();
            }

            prop_assert_eq!(visited.len(), expected.len());
            for ((offset, value), (expected_offset, expected_value)) in visited.iter().zip(&expected) {
                prop_assert_eq!(offset, expected_offset);
                prop_assert!((value - expected_value).abs() < 1e-6);
            }
        }

        /// Retreat walks the same buckets backwards
        #[test]
        fn retreat_reverses_buckets(points in points_strategy(), factor in 2i64..12) {
            let span = build_span(&points);
            let sample_nanos = factor * SAMPLE_NANOS;

            let mut forward = Vec::new();
            let mut cursor = DownsamplingCursor::seek(
                &span, 0, sample_nanos, Extractor::Maximum, Downsampler::Max,
            );
            let mut last = cursor;
            while cursor.is_valid() {
                forward.push(cursor.offset());
                last = cursor;
                cursor.advance();
            }

            let mut backward = Vec::new();
            let mut cursor = last;
            while cursor.is_valid() {
                backward.push(cursor.offset());
                cursor.retreat();
            }
            backward.reverse();
            prop_assert_eq!(forward, backward);
        }
    }
}

// =============================================================================
// Interpolating Cursor
// =============================================================================

mod interpolating_cursor {
    use super::*;

    proptest! {
        /// Every offset between the first and last sample gets a value
        /// exactly when the surrounding gap is within the limit
        #[test]
        fn gap_limit_decides_validity(points in points_strategy(), max_distance in 0i32..10) {
            let span = build_span(&points);
            let mut cursor = InterpolatingCursor::new(
                &span, 0, SAMPLE_NANOS, max_distance,
                Extractor::Average, Downsampler::Avg, Derivative::None,
            );

            let first = *points.keys().next().unwrap();
            let last = *points.keys().next_back().unwrap();
            for offset in first..=last {
                cursor.advance_to(offset);
                prop_assert!(cursor.is_valid());

                let value = cursor.value();
                if let Some(&real) = points.get(&offset) {
                    prop_assert_eq!(value, Some(real));
                    continue;
                }

                let prev = *points.range(..offset).next_back().unwrap().0;
                let next = *points.range(offset..).next().unwrap().0;
                let allowed = max_distance == 0 || next - prev <= max_distance;
                prop_assert_eq!(value.is_some(), allowed);
            }

            cursor.advance_to(last + 1);
            prop_assert!(!cursor.is_valid());
            prop_assert_eq!(cursor.value(), None);
        }

        /// Interpolated values stay between their neighbours
        #[test]
        fn interpolation_is_bounded(points in points_strategy()) {
            let span = build_span(&points);
            let mut cursor = InterpolatingCursor::new(
                &span, 0, SAMPLE_NANOS, 0,
                Extractor::Average, Downsampler::Avg, Derivative::None,
            );

            let first = *points.keys().next().unwrap();
            let last = *points.keys().next_back().unwrap();
            for offset in first..=last {
                cursor.advance_to(offset);
                let value = cursor.value().unwrap();
                let prev = points.range(..=offset).next_back().unwrap().1;
                let next = points.range(offset..).next().unwrap().1;
                prop_assert!(value >= prev.min(*next) - 1e-9);
                prop_assert!(value <= prev.max(*next) + 1e-9);
            }
        }

        /// A non-negative derivative is never negative
        #[test]
        fn non_negative_derivative(points in points_strategy()) {
            let span = build_span(&points);
            let mut cursor = InterpolatingCursor::new(
                &span, 0, SAMPLE_NANOS, 0,
                Extractor::Average, Downsampler::Avg, Derivative::NonNegativeDerivative,
            );

            let last = *points.keys().next_back().unwrap();
            for offset in 0..=last {
                cursor.advance_to(offset);
                if let Some(value) = cursor.value() {
                    prop_assert!(value >= 0.0);
                }
            }
        }
    }
}

// =============================================================================
// Aggregating Merge
// =============================================================================

mod aggregating_merge {
    use super::*;

    proptest! {
        /// The merge visits exactly the union of the sources' offsets
        #[test]
        fn visits_union_of_offsets(
            sources in prop::collection::vec(points_strategy(), 1..4)
        ) {
            let spans: Vec<Span> = sources.iter().map(build_span).collect();
            let cursors = spans
                .iter()
                .map(|span| InterpolatingCursor::new(
                    span, 0, SAMPLE_NANOS, 0,
                    Extractor::Average, Downsampler::Avg, Derivative::None,
                ))
                .collect();

            let mut merge = AggregatingMerge::new(cursors);
            merge.init();

            let mut visited = Vec::new();
            while let Some(ts) = merge.timestamp() {
                visited.push(((ts - SAMPLE_NANOS / 2) / SAMPLE_NANOS) as i32);
                // Some source always has a real value at a visited offset
                prop_assert!(merge.sum().is_some());
                merge.advance();
            }

            let union: BTreeSet<i32> = sources.iter().flat_map(|p| p.keys().copied()).collect();
            prop_assert_eq!(visited, union.into_iter().collect::<Vec<_>>());
        }

        /// Sum over one source reproduces that source
        #[test]
        fn single_source_sum_is_identity(points in points_strategy()) {
            let span = build_span(&points);
            let cursor = InterpolatingCursor::new(
                &span, 0, SAMPLE_NANOS, 0,
                Extractor::Average, Downsampler::Avg, Derivative::None,
            );
            let mut merge = AggregatingMerge::new(vec![cursor]);
            merge.init();

            let mut values = Vec::new();
            while merge.is_valid() {
                values.push(merge.sum().unwrap());
                merge.advance();
            }
            prop_assert_eq!(values, points.values().copied().collect::<Vec<_>>());
        }
    }
}
