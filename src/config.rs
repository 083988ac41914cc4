//! On-disk daemon configuration, layered under the CLI flags in
//! `crate::cli`. Mirrors the teacher's preference for `serde`-backed
//! config documents over a bespoke parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    #[serde(default = "default_min_consistency")]
    pub min_consistency: u32,
    #[serde(default = "default_segment_size_bytes")]
    pub segment_size_bytes: u64,
    #[serde(default = "default_segment_max_rows")]
    pub segment_max_rows: u64,
}

fn default_replication_factor() -> u32 {
    1
}

fn default_min_consistency() -> u32 {
    1
}

fn default_segment_size_bytes() -> u64 {
    eventql_partition::DEFAULT_SEGMENT_SIZE_BYTES
}

fn default_segment_max_rows() -> u64 {
    eventql_partition::DEFAULT_SEGMENT_MAX_ROWS
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            replication_factor: default_replication_factor(),
            min_consistency: default_min_consistency(),
            segment_size_bytes: default_segment_size_bytes(),
            segment_max_rows: default_segment_max_rows(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, crate::error::EventQlError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = std::fs::read(path).map_err(|e| crate::error::EventQlError::from_io_error(e, "reading config file"))?;
        serde_yaml::from_slice(&bytes)
            .map_err(|e| crate::error::EventQlError::Config { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_node_expectations() {
        let config = DaemonConfig::default();
        assert_eq!(config.replication_factor, 1);
        assert_eq!(config.min_consistency, 1);
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn load_parses_partial_yaml_with_defaults_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eventql.yaml");
        std::fs::write(&path, "replication_factor: 3\nmin_consistency: 2\n").unwrap();
        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.min_consistency, 2);
        assert_eq!(config.segment_max_rows, eventql_partition::DEFAULT_SEGMENT_MAX_ROWS);
    }
}
