use eventql_coordinator::CoordinatorError;
use eventql_partition::PartitionError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// A record was missing a column named in the table's primary key or
    /// partition key.
    MissingField { field: String },
    /// Not enough `UP` servers were available to satisfy the requested
    /// replica count.
    InsufficientServers { available: usize, required: usize },
    /// Fewer replicas confirmed the write than the cluster's
    /// `min_consistency` requires.
    ConsistencyNotMet { confirmed: usize, required: usize },
    Coordinator(CoordinatorError),
    Partition(PartitionError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::MissingField { field } => write!(f, "record is missing field '{field}'"),
            IngestError::InsufficientServers { available, required } => {
                write!(f, "insufficient servers: {available} available, {required} required")
            }
            IngestError::ConsistencyNotMet { confirmed, required } => {
                write!(f, "only {confirmed} of {required} required replicas confirmed the write")
            }
            IngestError::Coordinator(err) => write!(f, "coordinator error: {err}"),
            IngestError::Partition(err) => write!(f, "partition error: {err}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<CoordinatorError> for IngestError {
    fn from(err: CoordinatorError) -> Self {
        IngestError::Coordinator(err)
    }
}

impl From<PartitionError> for IngestError {
    fn from(err: PartitionError) -> Self {
        IngestError::Partition(err)
    }
}
