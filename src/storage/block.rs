//! Sample block value codec
//!
//! Binary layout (little-endian):
//!
//! ```text
//! version (u8) | start ts (i64) | sample duration (i64) | sample count (u32)
//! per sample:   offset (i32) | count (u32) | sum (f64) | flags (u8)
//!               [max (f64) if flags & HAS_MAX] [min (f64) if flags & HAS_MIN]
//! checksum (u64, CRC-64/ECMA-182 over everything before it)
//! ```

use crate::error::EncodingError;
use crate::types::{Sample, SampleBlock};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Current block format version
pub const BLOCK_FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 1 + 8 + 8 + 4;
const SAMPLE_FIXED_SIZE: usize = 4 + 4 + 8 + 1;
const CHECKSUM_SIZE: usize = 8;

const HAS_MAX: u8 = 0b01;
const HAS_MIN: u8 = 0b10;

fn checksum(data: &[u8]) -> u64 {
    crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182).checksum(data)
}

/// Encode a block into its stored value
pub fn encode_block(block: &SampleBlock) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        HEADER_SIZE + block.samples.len() * (SAMPLE_FIXED_SIZE + 16) + CHECKSUM_SIZE,
    );

    buf.put_u8(BLOCK_FORMAT_VERSION);
    buf.put_i64_le(block.start_timestamp_nanos);
    buf.put_i64_le(block.sample_duration_nanos);
    buf.put_u32_le(block.samples.len() as u32);

    for sample in &block.samples {
        buf.put_i32_le(sample.offset);
        buf.put_u32_le(sample.count);
        buf.put_f64_le(sample.sum);

        let mut flags = 0u8;
        if sample.max.is_some() {
            flags |= HAS_MAX;
        }
        if sample.min.is_some() {
            flags |= HAS_MIN;
        }
        buf.put_u8(flags);
        if let Some(max) = sample.max {
            buf.put_f64_le(max);
        }
        if let Some(min) = sample.min {
            buf.put_f64_le(min);
        }
    }

    let crc = checksum(&buf);
    buf.put_u64_le(crc);
    buf.freeze()
}

/// Decode a stored value into a block
///
/// # Errors
///
/// Returns an encoding error if the value is truncated, fails checksum
/// verification, carries an unknown version or holds samples whose offsets
/// are not strictly increasing.
pub fn decode_block(data: &[u8]) -> Result<SampleBlock, EncodingError> {
    if data.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(EncodingError::Truncated {
            what: "block header",
            needed: HEADER_SIZE + CHECKSUM_SIZE,
            available: data.len(),
        });
    }

    let (payload, mut trailer) = data.split_at(data.len() - CHECKSUM_SIZE);
    let expected = trailer.get_u64_le();
    let actual = checksum(payload);
    if expected != actual {
        return Err(EncodingError::ChecksumMismatch { expected, actual });
    }

    let mut buf = payload;
    let version = buf.get_u8();
    if version != BLOCK_FORMAT_VERSION {
        return Err(EncodingError::InvalidBlock(format!(
            "unsupported block version {}",
            version
        )));
    }

    let start_timestamp_nanos = buf.get_i64_le();
    let sample_duration_nanos = buf.get_i64_le();
    let count = buf.get_u32_le() as usize;

    if sample_duration_nanos <= 0 {
        return Err(EncodingError::InvalidBlock(format!(
            "non-positive sample duration {}",
            sample_duration_nanos
        )));
    }

    // Every sample needs at least its fixed part; reject absurd counts
    // before allocating.
    if buf.remaining() < count.saturating_mul(SAMPLE_FIXED_SIZE) {
        return Err(EncodingError::Truncated {
            what: "block samples",
            needed: count.saturating_mul(SAMPLE_FIXED_SIZE),
            available: buf.remaining(),
        });
    }

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < SAMPLE_FIXED_SIZE {
            return Err(EncodingError::Truncated {
                what: "sample",
                needed: SAMPLE_FIXED_SIZE,
                available: buf.remaining(),
            });
        }
        let offset = buf.get_i32_le();
        let sample_count = buf.get_u32_le();
        let sum = buf.get_f64_le();
        let flags = buf.get_u8();

        let optional_len = ((flags & HAS_MAX != 0) as usize + (flags & HAS_MIN != 0) as usize) * 8;
        if buf.remaining() < optional_len {
            return Err(EncodingError::Truncated {
                what: "sample max/min",
                needed: optional_len,
                available: buf.remaining(),
            });
        }
        let max = (flags & HAS_MAX != 0).then(|| buf.get_f64_le());
        let min = (flags & HAS_MIN != 0).then(|| buf.get_f64_le());

        if let Some(prev) = samples.last().map(|s: &Sample| s.offset) {
            if offset <= prev {
                return Err(EncodingError::InvalidBlock(format!(
                    "sample offsets not strictly increasing: {} after {}",
                    offset, prev
                )));
            }
        }

        samples.push(Sample {
            offset,
            count: sample_count,
            sum,
            max,
            min,
        });
    }

    if buf.has_remaining() {
        return Err(EncodingError::InvalidBlock(format!(
            "{} trailing bytes after samples",
            buf.remaining()
        )));
    }

    Ok(SampleBlock::new(
        start_timestamp_nanos,
        sample_duration_nanos,
        samples,
    ))
}
