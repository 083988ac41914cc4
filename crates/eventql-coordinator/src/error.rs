use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    NotFound { context: String },
    /// A CAS advance of `(prev_txid, prev_seq)` lost the race against a
    /// concurrent writer; the caller must `fetch_latest` and retry.
    BadVersion { context: String },
    /// A `create_file` quorum (N of N) could not be reached; any servers
    /// that did accept the write have already been rolled back.
    QuorumFailed { context: String, succeeded: usize, required: usize },
    Io { context: String, reason: String },
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::NotFound { context } => write!(f, "not found: {context}"),
            CoordinatorError::BadVersion { context } => write!(f, "version conflict: {context}"),
            CoordinatorError::QuorumFailed { context, succeeded, required } => {
                write!(f, "quorum not reached for {context}: {succeeded}/{required}")
            }
            CoordinatorError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<eventql_metadata::MetadataError> for CoordinatorError {
    fn from(e: eventql_metadata::MetadataError) -> Self {
        match e {
            eventql_metadata::MetadataError::NotFound { context } => CoordinatorError::NotFound { context },
            eventql_metadata::MetadataError::AlreadyExists { context } => {
                CoordinatorError::QuorumFailed { context, succeeded: 0, required: 1 }
            }
            eventql_metadata::MetadataError::Io { context, reason } => CoordinatorError::Io { context, reason },
            eventql_metadata::MetadataError::Corruption { context, reason } => {
                CoordinatorError::Io { context, reason }
            }
            eventql_metadata::MetadataError::IllegalArgument { reason } => {
                CoordinatorError::Io { context: "metadata file".to_string(), reason }
            }
        }
    }
}
