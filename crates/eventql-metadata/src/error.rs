//! Error types for metadata file and metadata store operations.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataError {
    NotFound {
        context: String,
    },
    AlreadyExists {
        context: String,
    },
    IllegalArgument {
        reason: String,
    },
    /// An on-disk metadata file failed one of the invariants in `MetadataFile::validate`.
    Corruption {
        context: String,
        reason: String,
    },
    Io {
        context: String,
        reason: String,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::NotFound { context } => write!(f, "not found: {context}"),
            MetadataError::AlreadyExists { context } => write!(f, "already exists: {context}"),
            MetadataError::IllegalArgument { reason } => write!(f, "illegal argument: {reason}"),
            MetadataError::Corruption { context, reason } => {
                write!(f, "corrupt metadata file in {context}: {reason}")
            }
            MetadataError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for MetadataError {}

impl MetadataError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        MetadataError::Io {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound { .. })
    }
}
