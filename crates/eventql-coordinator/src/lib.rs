//! Metadata Coordinator & Client (component G): owns the `(txid, seq)`
//! timeline of every table's metadata file and resolves
//! `(namespace, table, key)` to a partition and its insert targets.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{MetadataCoordinator, PartitionTarget};
pub use error::CoordinatorError;
pub use transport::{LocalMetadataServerTransport, MetadataServerTransport};

pub use tracing::{debug, error, info, trace, warn};
