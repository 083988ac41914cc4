use std::fmt;

#[derive(Debug)]
pub enum EventQlError {
    Config { reason: String },
    Directory(eventql_directory::DirectoryError),
    Coordinator(eventql_coordinator::CoordinatorError),
    Partition(eventql_partition::PartitionError),
    Io { context: String, reason: String },
}

impl fmt::Display for EventQlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventQlError::Config { reason } => write!(f, "config error: {reason}"),
            EventQlError::Directory(err) => write!(f, "cluster directory error: {err}"),
            EventQlError::Coordinator(err) => write!(f, "metadata coordinator error: {err}"),
            EventQlError::Partition(err) => write!(f, "partition error: {err}"),
            EventQlError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for EventQlError {}

impl EventQlError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        EventQlError::Io { context: context.to_string(), reason: e.to_string() }
    }
}

impl From<eventql_directory::DirectoryError> for EventQlError {
    fn from(err: eventql_directory::DirectoryError) -> Self {
        EventQlError::Directory(err)
    }
}

impl From<eventql_coordinator::CoordinatorError> for EventQlError {
    fn from(err: eventql_coordinator::CoordinatorError) -> Self {
        EventQlError::Coordinator(err)
    }
}

impl From<eventql_partition::PartitionError> for EventQlError {
    fn from(err: eventql_partition::PartitionError) -> Self {
        EventQlError::Partition(err)
    }
}
