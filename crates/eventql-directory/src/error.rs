//! Error types for cluster directory operations.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryError {
    NotFound { context: String },
    AlreadyExists { context: String },
    IllegalArgument { reason: String },
    /// An operation was attempted in the wrong session state (e.g. a write
    /// while `ConnectionLost`).
    IllegalState { context: String },
    /// A CAS write lost the race; the caller must re-read and retry.
    BadVersion { context: String, expected: u64, actual: u64 },
    Timeout { context: String },
    Io { context: String, reason: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::NotFound { context } => write!(f, "not found: {context}"),
            DirectoryError::AlreadyExists { context } => write!(f, "already exists: {context}"),
            DirectoryError::IllegalArgument { reason } => write!(f, "illegal argument: {reason}"),
            DirectoryError::IllegalState { context } => write!(f, "illegal state: {context}"),
            DirectoryError::BadVersion { context, expected, actual } => write!(
                f,
                "version conflict on {context}: expected {expected}, found {actual}"
            ),
            DirectoryError::Timeout { context } => write!(f, "timed out: {context}"),
            DirectoryError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl DirectoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DirectoryError::Timeout { .. } | DirectoryError::Io { .. } | DirectoryError::IllegalState { .. }
        )
    }
}
