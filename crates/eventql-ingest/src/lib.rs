//! Ingestion Router (component H) and Server Allocator (component I): the
//! per-record routing path from a raw record stream down to partition
//! writers, plus the replica-selection strategy used when assigning a
//! partition's server set.

pub mod allocator;
pub mod error;
pub mod router;

pub use allocator::{Candidate, ServerAllocator};
pub use error::IngestError;
pub use router::{IngestionRouter, InsertOutcome, InsertTarget, LocalInsertTarget, RawRecord, TableRoutingConfig};

pub use tracing::{debug, error, info, trace, warn};
