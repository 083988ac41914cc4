use eventql_columnar::ColumnarError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PartitionError {
    TableNotFound { namespace: String, table: String },
    PartitionNotFound { partition_id: String },
    /// An operation required `LIVE` (or another specific state) but the
    /// partition was found in a different one.
    IllegalState { partition_id: String, state: String },
    /// The manifest could not be fsynced; the caller must transition the
    /// partition out of `LIVE`.
    ManifestFsyncFailed { partition_id: String, reason: String },
    Columnar(ColumnarError),
    Io { context: String, reason: String },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionError::TableNotFound { namespace, table } => {
                write!(f, "table '{namespace}.{table}' not found")
            }
            PartitionError::PartitionNotFound { partition_id } => {
                write!(f, "partition '{partition_id}' not found")
            }
            PartitionError::IllegalState { partition_id, state } => {
                write!(f, "partition '{partition_id}' is in state {state}")
            }
            PartitionError::ManifestFsyncFailed { partition_id, reason } => {
                write!(f, "manifest fsync failed for partition '{partition_id}': {reason}")
            }
            PartitionError::Columnar(err) => write!(f, "columnar storage error: {err}"),
            PartitionError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for PartitionError {}

impl PartitionError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        PartitionError::Io { context: context.to_string(), reason: e.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PartitionError::TableNotFound { .. } | PartitionError::PartitionNotFound { .. })
    }
}

impl From<ColumnarError> for PartitionError {
    fn from(err: ColumnarError) -> Self {
        PartitionError::Columnar(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_table_not_found() {
        let error = PartitionError::TableNotFound { namespace: "ns1".to_string(), table: "t1".to_string() };
        assert_eq!(error.to_string(), "table 'ns1.t1' not found");
    }
}
