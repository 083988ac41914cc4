//! The immutable, versioned partition-map document.

use crate::error::MetadataError;
use crate::keyspace::{KeyspaceKey, KeyspaceType};
use serde::{Deserialize, Serialize};

/// 160-bit identifier for a partition or a metadata file transaction,
/// matching the original implementation's `SHA1Hash`-sized identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id160(pub [u8; 20]);

impl Id160 {
    pub fn from_sha1(data: &[u8]) -> Self {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Id160(bytes)
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(hex: &str) -> Result<Self, MetadataError> {
        if hex.len() != 40 {
            return Err(MetadataError::IllegalArgument {
                reason: format!("expected 40 hex chars, got {}", hex.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| MetadataError::IllegalArgument {
                reason: format!("bad hex digit: {e}"),
            })?;
        }
        Ok(Id160(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMapEntry {
    /// The smallest key that maps to this partition. The first entry's
    /// `begin` is always the empty key, matching every key below the
    /// second entry.
    pub begin: KeyspaceKey,
    pub partition_id: Id160,
    pub servers: Vec<String>,
    pub servers_joining: Vec<String>,
    pub servers_leaving: Vec<String>,
    pub splitting: bool,
    pub split_point: Option<KeyspaceKey>,
    pub split_partition_id_low: Option<Id160>,
    pub split_partition_id_high: Option<Id160>,
    pub split_servers_low: Vec<String>,
    pub split_servers_high: Vec<String>,
}

impl PartitionMapEntry {
    pub fn new(begin: KeyspaceKey, partition_id: Id160, servers: Vec<String>) -> Self {
        Self {
            begin,
            partition_id,
            servers,
            servers_joining: Vec::new(),
            servers_leaving: Vec::new(),
            splitting: false,
            split_point: None,
            split_partition_id_low: None,
            split_partition_id_high: None,
            split_servers_low: Vec::new(),
            split_servers_high: Vec::new(),
        }
    }
}

/// An immutable document encoding a partition map at a given `(txid, seq)`.
/// Shared by reference; a new txid always produces a new file, never a
/// mutation of an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub txid: Id160,
    pub seq: u64,
    pub keyspace_type: KeyspaceType,
    pub partition_map: Vec<PartitionMapEntry>,
}

impl MetadataFile {
    pub fn new(txid: Id160, seq: u64, keyspace_type: KeyspaceType, partition_map: Vec<PartitionMapEntry>) -> Self {
        Self {
            txid,
            seq,
            keyspace_type,
            partition_map,
        }
    }

    /// Returns the entry with the greatest `begin <= key`, i.e. the unique
    /// entry that owns `key`.
    pub fn lookup(&self, key: &KeyspaceKey) -> Result<&PartitionMapEntry, MetadataError> {
        if self.partition_map.is_empty() {
            return Err(MetadataError::NotFound {
                context: "empty partition map".to_string(),
            });
        }
        // Binary search for the largest begin <= key.
        let mut lo = 0usize;
        let mut hi = self.partition_map.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.keyspace_type.compare(&self.partition_map[mid].begin, key) != std::cmp::Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            return Err(MetadataError::Corruption {
                context: "lookup".to_string(),
                reason: "no entry with begin <= key (first entry must be the empty key)".to_string(),
            });
        }
        Ok(&self.partition_map[lo - 1])
    }

    /// Checks the invariants from the data model: strictly increasing
    /// `begin`, the first entry's `begin` is empty, and `split_point` (if
    /// present) lies strictly between this entry's `begin` and the next
    /// entry's `begin`.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.partition_map.is_empty() {
            return Err(MetadataError::IllegalArgument {
                reason: "partition map must have at least one entry".to_string(),
            });
        }
        if !self.partition_map[0].begin.is_empty() {
            return Err(MetadataError::IllegalArgument {
                reason: "first partition map entry must have an empty begin key".to_string(),
            });
        }
        for window in self.partition_map.windows(2) {
            let (prev, next) = (&window[0], &window[1]);
            if self.keyspace_type.compare(&prev.begin, &next.begin) != std::cmp::Ordering::Less {
                return Err(MetadataError::IllegalArgument {
                    reason: "partition map entries must have strictly increasing begin keys".to_string(),
                });
            }
        }
        for (i, entry) in self.partition_map.iter().enumerate() {
            if entry.splitting {
                let split_point = entry.split_point.as_ref().ok_or_else(|| MetadataError::IllegalArgument {
                    reason: "splitting entry must have a split_point".to_string(),
                })?;
                if self.keyspace_type.compare(&entry.begin, split_point) != std::cmp::Ordering::Less {
                    return Err(MetadataError::IllegalArgument {
                        reason: "split_point must lie strictly after this entry's begin".to_string(),
                    });
                }
                if let Some(next) = self.partition_map.get(i + 1) {
                    if self.keyspace_type.compare(split_point, &next.begin) != std::cmp::Ordering::Less {
                        return Err(MetadataError::IllegalArgument {
                            reason: "split_point must lie strictly before the next entry's begin".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        serde_json::to_vec(self).map_err(|e| MetadataError::Corruption {
            context: "encode".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        serde_json::from_slice(bytes).map_err(|e| MetadataError::Corruption {
            context: "decode".to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(begin: u64, pid: u8) -> PartitionMapEntry {
        PartitionMapEntry::new(
            KeyspaceType::encode_uint64(begin),
            Id160([pid; 20]),
            vec!["s1".to_string()],
        )
    }

    fn empty_entry(pid: u8) -> PartitionMapEntry {
        PartitionMapEntry::new(KeyspaceKey::empty(), Id160([pid; 20]), vec!["s1".to_string()])
    }

    #[test]
    fn lookup_returns_greatest_begin_leq_key() {
        let file = MetadataFile::new(
            Id160([0; 20]),
            1,
            KeyspaceType::Uint64,
            vec![empty_entry(1), entry(100, 2), entry(200, 3)],
        );
        assert_eq!(file.lookup(&KeyspaceType::encode_uint64(0)).unwrap().partition_id, Id160([1; 20]));
        assert_eq!(file.lookup(&KeyspaceType::encode_uint64(150)).unwrap().partition_id, Id160([2; 20]));
        assert_eq!(file.lookup(&KeyspaceType::encode_uint64(200)).unwrap().partition_id, Id160([3; 20]));
        assert_eq!(file.lookup(&KeyspaceType::encode_uint64(999)).unwrap().partition_id, Id160([3; 20]));
    }

    #[test]
    fn validate_rejects_non_increasing_begin() {
        let file = MetadataFile::new(
            Id160([0; 20]),
            1,
            KeyspaceType::Uint64,
            vec![empty_entry(1), entry(100, 2), entry(50, 3)],
        );
        assert!(file.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_empty_first_begin() {
        let file = MetadataFile::new(Id160([0; 20]), 1, KeyspaceType::Uint64, vec![entry(10, 1)]);
        assert!(file.validate().is_err());
    }

    #[test]
    fn validate_checks_split_point_bounds() {
        let mut e = empty_entry(1);
        e.splitting = true;
        e.split_point = Some(KeyspaceType::encode_uint64(50));
        let file = MetadataFile::new(Id160([0; 20]), 1, KeyspaceType::Uint64, vec![e, entry(100, 2)]);
        assert!(file.validate().is_ok());

        let mut e2 = empty_entry(1);
        e2.splitting = true;
        e2.split_point = Some(KeyspaceType::encode_uint64(150)); // outside bounds
        let file2 = MetadataFile::new(Id160([0; 20]), 1, KeyspaceType::Uint64, vec![e2, entry(100, 2)]);
        assert!(file2.validate().is_err());
    }

    #[test]
    fn encode_decode_round_trips() {
        let file = MetadataFile::new(
            Id160([7; 20]),
            3,
            KeyspaceType::String,
            vec![empty_entry(1), entry(10, 2)],
        );
        let encoded = file.encode().unwrap();
        let decoded = MetadataFile::decode(&encoded).unwrap();
        assert_eq!(file, decoded);
    }

    #[test]
    fn id160_hex_round_trips() {
        let id = Id160::from_sha1(b"hello");
        let hex = id.to_hex();
        let back = Id160::from_hex(&hex).unwrap();
        assert_eq!(id, back);
    }
}
