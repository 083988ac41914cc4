//! The totally-ordered keyspace a table's partition map is built over, and
//! the partitioner functions that derive a key from a record's partition-key
//! column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyspaceType {
    Uint64,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionerType {
    TimeWindow,
    Uint64,
    String,
}

/// A key in the table's keyspace, already encoded per `KeyspaceType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceKey(pub Vec<u8>);

impl KeyspaceKey {
    pub fn empty() -> Self {
        KeyspaceKey(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl KeyspaceType {
    /// Encodes a raw value into this keyspace's comparable byte representation.
    pub fn encode_uint64(value: u64) -> KeyspaceKey {
        KeyspaceKey(value.to_le_bytes().to_vec())
    }

    pub fn encode_string(value: &str) -> KeyspaceKey {
        KeyspaceKey(value.as_bytes().to_vec())
    }

    /// Total order over two keys under this keyspace's comparator.
    /// `UINT64` keys compare numerically (little-endian 8-byte values);
    /// `STRING` keys compare bytewise lexicographically.
    pub fn compare(self, a: &KeyspaceKey, b: &KeyspaceKey) -> std::cmp::Ordering {
        match self {
            KeyspaceType::Uint64 => {
                let a_val = decode_uint64(a);
                let b_val = decode_uint64(b);
                a_val.cmp(&b_val)
            }
            KeyspaceType::String => a.0.cmp(&b.0),
        }
    }
}

fn decode_uint64(key: &KeyspaceKey) -> u64 {
    if key.is_empty() {
        // The empty key sorts below every other UINT64 key (it represents
        // "matches all keys below the second entry").
        return 0;
    }
    let mut buf = [0u8; 8];
    let len = key.0.len().min(8);
    buf[..len].copy_from_slice(&key.0[..len]);
    u64::from_le_bytes(buf)
}

impl PartitionerType {
    /// `TIMEWINDOW`: key = floor(ts / window_us) * window_us, as UINT64 microseconds.
    pub fn time_window_key(ts_micros: u64, window_micros: u64) -> KeyspaceKey {
        let bucket = (ts_micros / window_micros) * window_micros;
        KeyspaceType::encode_uint64(bucket)
    }

    pub fn keyspace_type(self) -> KeyspaceType {
        match self {
            PartitionerType::TimeWindow | PartitionerType::Uint64 => KeyspaceType::Uint64,
            PartitionerType::String => KeyspaceType::String,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn uint64_keys_compare_numerically() {
        let a = KeyspaceType::encode_uint64(10);
        let b = KeyspaceType::encode_uint64(20);
        assert_eq!(KeyspaceType::Uint64.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn string_keys_compare_bytewise() {
        let a = KeyspaceType::encode_string("aaa");
        let b = KeyspaceType::encode_string("aab");
        assert_eq!(KeyspaceType::String.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn empty_key_sorts_below_everything() {
        let empty = KeyspaceKey::empty();
        let k = KeyspaceType::encode_uint64(1);
        assert_eq!(KeyspaceType::Uint64.compare(&empty, &k), Ordering::Less);
    }

    #[test]
    fn time_window_buckets_floor_to_window() {
        let window = 1_000u64;
        let key = PartitionerType::time_window_key(2_500, window);
        assert_eq!(key, KeyspaceType::encode_uint64(2_000));
        let key2 = PartitionerType::time_window_key(2_999, window);
        assert_eq!(key2, KeyspaceType::encode_uint64(2_000));
        let key3 = PartitionerType::time_window_key(3_000, window);
        assert_eq!(key3, KeyspaceType::encode_uint64(3_000));
    }
}
