//! Span - normalized per-source view over stored sample blocks
//!
//! The samples of a single source may be spread across many stored blocks,
//! each with offsets relative to its own start timestamp. A [`Span`]
//! re-expresses every sample offset relative to one shared origin so that the
//! cursors built on top of it can treat the data as one monotonic sequence.

use crate::query::error::{QueryError, QueryResult};
use crate::types::SampleBlock;

/// Retained size of a [`Span`], used for memory accounting
pub const SIZE_OF_SPAN: i64 = std::mem::size_of::<Span>() as i64;

/// Retained size of a [`CalibratedBlock`] excluding its samples
pub const SIZE_OF_CALIBRATED_BLOCK: i64 = std::mem::size_of::<CalibratedBlock>() as i64;

/// A stored block plus the adjustment that re-expresses its sample offsets
/// relative to the owning span's origin.
#[derive(Debug, Clone)]
pub struct CalibratedBlock {
    block: SampleBlock,
    offset_adjustment: i32,
}

impl CalibratedBlock {
    /// Calibrated offset of the sample at `idx`
    #[inline]
    pub fn offset_at(&self, idx: usize) -> i32 {
        self.block.samples[idx].offset + self.offset_adjustment
    }

    /// Calibrated offset of the last sample
    #[inline]
    pub fn last_offset(&self) -> i32 {
        self.offset_at(self.len() - 1)
    }

    /// Number of samples in the block
    #[inline]
    pub fn len(&self) -> usize {
        self.block.samples.len()
    }

    /// Calibrated blocks are never empty; provided for API symmetry
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block.samples.is_empty()
    }

    /// The underlying stored block
    pub fn block(&self) -> &SampleBlock {
        &self.block
    }

    /// Adjustment added to every stored offset
    pub fn offset_adjustment(&self) -> i32 {
        self.offset_adjustment
    }
}

/// Monolithic view of a single source over an arbitrary time span
///
/// Blocks must be added in chronological order and must share the span's
/// sample duration.
#[derive(Debug, Clone)]
pub struct Span {
    start_nanos: i64,
    sample_nanos: i64,
    blocks: Vec<CalibratedBlock>,
}

impl Span {
    /// Create an empty span with the given origin and sample duration
    pub fn new(start_nanos: i64, sample_nanos: i64) -> Self {
        Self {
            start_nanos,
            sample_nanos,
            blocks: Vec::with_capacity(1),
        }
    }

    /// Add a block to the span, calibrating its offsets to the span origin
    ///
    /// Blocks without samples are ignored.
    ///
    /// # Errors
    ///
    /// Returns a data integrity error if the block's sample duration differs
    /// from the span's, or if its first sample does not come strictly after
    /// the last sample already in the span.
    pub fn add_block(&mut self, block: SampleBlock) -> QueryResult<()> {
        if block.sample_duration_nanos != self.sample_nanos {
            return Err(QueryError::data_integrity(format!(
                "block added to span with mismatched sample duration: {} != {}",
                block.sample_duration_nanos, self.sample_nanos
            )));
        }

        if block.samples.is_empty() {
            return Ok(());
        }

        let adjustment = (block.start_timestamp_nanos - self.start_nanos) / self.sample_nanos;
        let calibrated = CalibratedBlock {
            block,
            offset_adjustment: adjustment as i32,
        };

        if let Some(last) = self.blocks.last() {
            if calibrated.offset_at(0) <= last.last_offset() {
                return Err(QueryError::data_integrity(
                    "blocks must be added to a span in chronological order",
                ));
            }
        }

        self.blocks.push(calibrated);
        Ok(())
    }

    /// Origin timestamp every offset is relative to
    #[inline]
    pub fn start_nanos(&self) -> i64 {
        self.start_nanos
    }

    /// Sample duration of the span's offsets
    #[inline]
    pub fn sample_nanos(&self) -> i64 {
        self.sample_nanos
    }

    /// Calibrated blocks in chronological order
    #[inline]
    pub fn blocks(&self) -> &[CalibratedBlock] {
        &self.blocks
    }

    /// Returns true if the span holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of non-empty blocks in the span
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of samples across all blocks
    pub fn sample_count(&self) -> usize {
        self.blocks.iter().map(CalibratedBlock::len).sum()
    }
}
