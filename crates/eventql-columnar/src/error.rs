//! Error types for columnar file I/O.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnarError {
    Io {
        context: String,
        reason: String,
    },
    /// Raised when a reader encounters a format-version tag it does not understand.
    UnsupportedVersion {
        found: u32,
        supported: u32,
    },
    /// An on-disk invariant was violated (truncated file, bad column directory, ...).
    Corruption {
        context: String,
        reason: String,
    },
    /// A column operation was attempted in the wrong writer/reader lifecycle state.
    IllegalState {
        context: String,
    },
    ColumnNotFound {
        name: String,
    },
}

impl fmt::Display for ColumnarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnarError::Io { context, reason } => {
                write!(f, "I/O error in {context}: {reason}")
            }
            ColumnarError::UnsupportedVersion { found, supported } => write!(
                f,
                "unsupported columnar file format version {found} (this build supports {supported})"
            ),
            ColumnarError::Corruption { context, reason } => {
                write!(f, "corrupt columnar file in {context}: {reason}")
            }
            ColumnarError::IllegalState { context } => {
                write!(f, "illegal state: {context}")
            }
            ColumnarError::ColumnNotFound { name } => write!(f, "column '{name}' not found"),
        }
    }
}

impl std::error::Error for ColumnarError {}

impl ColumnarError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ColumnarError::Io {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, ColumnarError::Corruption { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_unsupported_version() {
        let err = ColumnarError::UnsupportedVersion {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "unsupported columnar file format version 9 (this build supports 1)"
        );
    }

    #[test]
    fn from_io_error_wraps_reason() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ColumnarError::from_io_error(io, "opening segment");
        match err {
            ColumnarError::Io { context, reason } => {
                assert_eq!(context, "opening segment");
                assert!(reason.contains("missing"));
            }
            _ => panic!("wrong variant"),
        }
    }
}
