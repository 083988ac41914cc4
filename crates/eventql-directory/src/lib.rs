//! Cluster Directory (component D): a watch-driven cache over an external
//! strongly-consistent coordination service, giving the rest of the system
//! a synchronous, typed view of cluster/server/namespace/table config.

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod model;

pub use coordinator::{CoordinatorClient, LocalCoordinator, WatchEvent, WatchEventKind, Watcher};
pub use directory::{CallbackFn, ClusterDirectory, ServerId, SessionState};
pub use error::DirectoryError;
pub use model::{
    AlterTableOperation, ClusterConfig, FieldType, NamespaceConfig, SchemaField, ServerConfig, ServerStatus,
    TableDefinition,
};

pub use tracing::{debug, error, info, trace, warn};
