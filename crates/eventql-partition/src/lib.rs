//! Partition Map (component E) and LSM Partition Writer (component F): the
//! local index of partitions this server owns, and the per-partition
//! segmented write/compaction/split path backing it.

pub mod error;
pub mod map;
pub mod writer;

pub use error::PartitionError;
pub use map::{PartitionChangeKind, PartitionChangeNotification, PartitionMap, TableKey};
pub use writer::{ColumnValue, IncomingRecord, PartitionState, PartitionWriter, DEFAULT_SEGMENT_MAX_ROWS, DEFAULT_SEGMENT_SIZE_BYTES};

pub use log::{debug, error, info, trace, warn};
