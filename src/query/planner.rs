//! Memory budget planner
//!
//! Works out the longest timespan a single query pass may cover so that the
//! spans it materializes stay inside a worker memory budget. The estimate
//! charges every source a completely full slab for each slab the pass may
//! touch, including the extra slabs read on both sides of the range to
//! satisfy the interpolation limit.

use crate::query::error::{QueryError, QueryResult};
use crate::types::{Resolution, Sample, SampleBlock};

const SIZE_OF_BLOCK: i64 = std::mem::size_of::<SampleBlock>() as i64;
const SIZE_OF_SAMPLE: i64 = std::mem::size_of::<Sample>() as i64;

/// Retained size of one completely full slab at `resolution`
pub fn slab_size(resolution: Resolution) -> i64 {
    SIZE_OF_BLOCK + resolution.samples_per_slab() * SIZE_OF_SAMPLE
}

/// Number of slabs read outside the queried range to honour
/// `interpolation_limit_nanos`
pub fn interpolation_buffer_slabs(resolution: Resolution, interpolation_limit_nanos: i64) -> i64 {
    let slab = resolution.slab_duration_nanos();
    let one_side = (interpolation_limit_nanos as f64 / slab as f64).ceil() as i64;
    let mut buffer = one_side * 2;

    // A range that does not start on a slab boundary can straddle one more
    // slab than the limit alone accounts for.
    if one_side * slab - interpolation_limit_nanos < slab / 2 {
        buffer += 1;
    }
    buffer
}

/// Longest timespan, in nanoseconds, that can be queried in one pass
///
/// # Errors
///
/// Returns a validation error if `estimated_source_count` is not positive,
/// and a resource limit error if the budget cannot hold even a single slab
/// per source beyond the interpolation buffer.
///
/// # Example
///
/// ```rust
/// use rollup_tsdb::query::planner::{max_timespan, slab_size};
/// use rollup_tsdb::types::Resolution;
///
/// let r = Resolution::TenSeconds;
/// // Room for 3 slabs per source, one of which goes to the buffer
/// let budget = 3 * slab_size(r) * 10;
/// assert_eq!(max_timespan(r, budget, 10, 0).unwrap(), 2 * r.slab_duration_nanos());
/// ```
pub fn max_timespan(
    resolution: Resolution,
    budget: i64,
    estimated_source_count: i64,
    interpolation_limit_nanos: i64,
) -> QueryResult<i64> {
    if estimated_source_count <= 0 {
        return Err(QueryError::validation(format!(
            "estimated source count must be positive, got {}",
            estimated_source_count
        )));
    }

    let buffer = interpolation_buffer_slabs(resolution, interpolation_limit_nanos);
    let per_source = budget / estimated_source_count;
    let num_slabs = per_source / slab_size(resolution) - buffer;
    if num_slabs <= 0 {
        return Err(QueryError::resource_limit(
            "insufficient memory budget to attempt query",
        ));
    }

    Ok(num_slabs * resolution.slab_duration_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryErrorKind;

    const R: Resolution = Resolution::TenSeconds;

    #[test]
    fn test_buffer_without_interpolation_limit() {
        // ceil(0) = 0, and 0 - 0 < half a slab adds one
        assert_eq!(interpolation_buffer_slabs(R, 0), 1);
    }

    #[test]
    fn test_buffer_with_interpolation_limit() {
        let slab = R.slab_duration_nanos();
        // Tiny limit: one slab per side, and slab - limit >= slab / 2
        assert_eq!(interpolation_buffer_slabs(R, 20_000_000_000), 2);
        // Limit close to a full slab: one slab per side plus one
        assert_eq!(interpolation_buffer_slabs(R, slab - 1), 3);
        assert_eq!(interpolation_buffer_slabs(R, slab), 3);
        assert_eq!(interpolation_buffer_slabs(R, slab + 1), 4);
    }

    #[test]
    fn test_max_timespan_scales_with_budget() {
        let size = slab_size(R);
        let slab = R.slab_duration_nanos();
        let sources = 4;

        for slabs in 2..10 {
            let budget = slabs * size * sources;
            assert_eq!(
                max_timespan(R, budget, sources, 0).unwrap(),
                (slabs - 1) * slab
            );
        }

        // Leftover bytes below one slab do not buy more time
        assert_eq!(
            max_timespan(R, 5 * size * sources + size - 1, sources, 0).unwrap(),
            4 * slab
        );
    }

    #[test]
    fn test_max_timespan_scales_inversely_with_sources() {
        let size = slab_size(R);
        let budget = 101 * size;
        assert_eq!(max_timespan(R, budget, 1, 0).unwrap(), 100 * R.slab_duration_nanos());
        assert_eq!(max_timespan(R, budget, 10, 0).unwrap(), 9 * R.slab_duration_nanos());
    }

    #[test]
    fn test_insufficient_budget() {
        let err = max_timespan(R, slab_size(R), 1, 0).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ResourceLimit);
        assert!(err.message.contains("insufficient memory budget"));

        assert!(max_timespan(R, 0, 1, 0).is_err());
    }

    #[test]
    fn test_non_positive_source_count() {
        let err = max_timespan(R, i64::MAX, 0, 0).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);
    }
}
