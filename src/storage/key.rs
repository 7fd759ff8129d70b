//! Data key encoding
//!
//! Every stored block lives under a key built from its metric name, its
//! resolution, the start of the slab it covers and its source:
//!
//! ```text
//! +-------+--------+----------+------------+-------------+----------+
//! | "tsd" | res id | name len | name bytes | slab start  | source   |
//! | 3 B   | u8     | u16 BE   | variable   | i64 BE (*)  | rest     |
//! +-------+--------+----------+------------+-------------+----------+
//! ```
//!
//! (*) the sign bit of the timestamp is flipped so that the byte order of
//! keys matches the numeric order of timestamps, including negative ones.
//! All blocks of one metric at one resolution therefore sort by slab start
//! and then by source, which is what a range scan needs.

use crate::error::EncodingError;
use crate::types::Resolution;
use bytes::{BufMut, Bytes, BytesMut};

/// Prefix shared by every data key
pub const DATA_KEY_PREFIX: &[u8] = b"tsd";

const SIGN_FLIP: u64 = 1 << 63;

/// Decoded form of a data key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataKey {
    /// Metric name
    pub name: String,
    /// Source (host, node, ...) that produced the samples
    pub source: String,
    /// Resolution of the stored block
    pub resolution: Resolution,
    /// Slab-aligned start timestamp
    pub timestamp_nanos: i64,
}

/// Half-open `[start, end)` key range for ordered scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub start: Bytes,
    /// Exclusive upper bound
    pub end: Bytes,
}

impl KeyRange {
    /// Returns true if `key` falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_ref() && key < self.end.as_ref()
    }
}

impl DataKey {
    /// Create a key; the timestamp is aligned to its slab start
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        resolution: Resolution,
        timestamp_nanos: i64,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            resolution,
            timestamp_nanos: resolution.slab_start(timestamp_nanos),
        }
    }

    /// Encode the key to its binary form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            DATA_KEY_PREFIX.len() + 1 + 2 + self.name.len() + 8 + self.source.len(),
        );
        put_prefix(&mut buf, &self.name, self.resolution);
        put_timestamp(&mut buf, self.resolution.slab_start(self.timestamp_nanos));
        buf.put_slice(self.source.as_bytes());
        buf.freeze()
    }

    /// Decode a key produced by [`DataKey::encode`]
    ///
    /// # Errors
    ///
    /// Returns an encoding error if the buffer is truncated, does not carry
    /// the data key prefix, names an unknown resolution or holds invalid
    /// UTF-8.
    pub fn decode(buf: &[u8]) -> Result<Self, EncodingError> {
        let fixed = DATA_KEY_PREFIX.len() + 1 + 2;
        if buf.len() < fixed {
            return Err(EncodingError::Truncated {
                what: "data key header",
                needed: fixed,
                available: buf.len(),
            });
        }
        if &buf[..DATA_KEY_PREFIX.len()] != DATA_KEY_PREFIX {
            return Err(EncodingError::InvalidKey(
                "missing data key prefix".to_string(),
            ));
        }

        let res_id = buf[DATA_KEY_PREFIX.len()];
        let resolution = Resolution::from_id(res_id).ok_or_else(|| {
            EncodingError::InvalidKey(format!("unknown resolution id {}", res_id))
        })?;

        let name_len = u16::from_be_bytes([buf[fixed - 2], buf[fixed - 1]]) as usize;
        let name_end = fixed + name_len;
        let ts_end = name_end + 8;
        if buf.len() < ts_end {
            return Err(EncodingError::Truncated {
                what: "data key name and timestamp",
                needed: ts_end,
                available: buf.len(),
            });
        }

        let name = std::str::from_utf8(&buf[fixed..name_end])
            .map_err(|e| EncodingError::InvalidKey(format!("metric name is not UTF-8: {}", e)))?;

        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&buf[name_end..ts_end]);
        let timestamp_nanos = (u64::from_be_bytes(ts_bytes) ^ SIGN_FLIP) as i64;

        let source = std::str::from_utf8(&buf[ts_end..])
            .map_err(|e| EncodingError::InvalidKey(format!("source is not UTF-8: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            resolution,
            timestamp_nanos,
        })
    }

    /// Key range covering every source of `name` at `resolution` whose slab
    /// overlaps `[start_nanos, end_nanos]`
    pub fn scan_range(name: &str, resolution: Resolution, start_nanos: i64, end_nanos: i64) -> KeyRange {
        let first_slab = resolution.slab_start(start_nanos);
        let past_last_slab = resolution
            .slab_start(end_nanos)
            .saturating_add(resolution.slab_duration_nanos());

        KeyRange {
            start: timestamp_bound(name, resolution, first_slab),
            end: timestamp_bound(name, resolution, past_last_slab),
        }
    }
}

fn timestamp_bound(name: &str, resolution: Resolution, timestamp_nanos: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_KEY_PREFIX.len() + 1 + 2 + name.len() + 8);
    put_prefix(&mut buf, name, resolution);
    put_timestamp(&mut buf, timestamp_nanos);
    buf.freeze()
}

fn put_prefix(buf: &mut BytesMut, name: &str, resolution: Resolution) {
    buf.put_slice(DATA_KEY_PREFIX);
    buf.put_u8(resolution.id());
    // Names longer than u16::MAX are truncated by the length field; callers
    // never produce them.
    let name = &name.as_bytes()[..name.len().min(u16::MAX as usize)];
    buf.put_u16(name.len() as u16);
    buf.put_slice(name);
}

fn put_timestamp(buf: &mut BytesMut, timestamp_nanos: i64) {
    buf.put_u64((timestamp_nanos as u64) ^ SIGN_FLIP);
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000_000_000;

    #[test]
    fn test_encode_decode() {
        let key = DataKey::new("cpu.user", "node-1", Resolution::TenSeconds, HOUR + 42);
        assert_eq!(key.timestamp_nanos, HOUR);

        let decoded = DataKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_byte_order_matches_timestamp_order() {
        let r = Resolution::TenSeconds;
        let a = DataKey::new("m", "z", r, -HOUR).encode();
        let b = DataKey::new("m", "a", r, 0).encode();
        let c = DataKey::new("m", "a", r, HOUR).encode();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_scan_range_bounds() {
        let r = Resolution::TenSeconds;
        let range = DataKey::scan_range("m", r, HOUR + 5, 2 * HOUR + 5);

        assert!(range.contains(&DataKey::new("m", "a", r, HOUR).encode()));
        assert!(range.contains(&DataKey::new("m", "zzz", r, 2 * HOUR).encode()));
        assert!(!range.contains(&DataKey::new("m", "a", r, 0).encode()));
        assert!(!range.contains(&DataKey::new("m", "a", r, 3 * HOUR).encode()));
        // Other metrics and resolutions stay outside
        assert!(!range.contains(&DataKey::new("m2", "a", r, HOUR).encode()));
        assert!(!range.contains(&DataKey::new("m", "a", Resolution::ThirtyMinutes, HOUR).encode()));
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        assert!(matches!(
            DataKey::decode(b"ts"),
            Err(EncodingError::Truncated { .. })
        ));
        assert!(matches!(
            DataKey::decode(b"xyz\x01\x00\x00"),
            Err(EncodingError::InvalidKey(_))
        ));
        assert!(matches!(
            DataKey::decode(b"tsd\x09\x00\x00"),
            Err(EncodingError::InvalidKey(_))
        ));
        assert!(matches!(
            DataKey::decode(b"tsd\x01\x00\x05ab"),
            Err(EncodingError::Truncated { .. })
        ));
    }
}
