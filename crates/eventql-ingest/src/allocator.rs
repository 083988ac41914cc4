//! Server Allocator (component I): picks insert-target replicas from the
//! set of servers a partition is configured to be served by.

use crate::error::IngestError;
use eventql_directory::ServerStatus;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The fields the allocator needs from a server config. Kept narrow so
/// callers can build one from `eventql_directory::ServerConfig` directly.
pub struct Candidate {
    pub server_id: String,
    pub status: ServerStatus,
}

/// Round-robins over `UP` candidates starting from a seeded offset, so
/// repeated calls spread load instead of always favoring the first server
/// in the list. A candidate that's transiently `Down` is skipped rather
/// than shifting every other candidate's position.
pub struct ServerAllocator {
    offset: AtomicUsize,
}

impl Default for ServerAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerAllocator {
    pub fn new() -> Self {
        Self { offset: AtomicUsize::new(0) }
    }

    pub fn with_seed(seed: usize) -> Self {
        Self { offset: AtomicUsize::new(seed) }
    }

    /// Returns up to `count` distinct `UP` server ids from `candidates`,
    /// starting at the allocator's current rotation offset. Errors if
    /// fewer than `count` candidates are `UP`.
    pub fn allocate(&self, candidates: &[Candidate], count: usize) -> Result<Vec<String>, IngestError> {
        let up: Vec<&Candidate> = candidates.iter().filter(|c| c.status == ServerStatus::Up).collect();
        if up.len() < count {
            return Err(IngestError::InsufficientServers { available: up.len(), required: count });
        }
        let start = self.offset.fetch_add(1, Ordering::Relaxed) % up.len();
        let chosen = (0..count).map(|i| up[(start + i) % up.len()].server_id.clone()).collect();
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { server_id: "s1".to_string(), status: ServerStatus::Up },
            Candidate { server_id: "s2".to_string(), status: ServerStatus::Down },
            Candidate { server_id: "s3".to_string(), status: ServerStatus::Up },
            Candidate { server_id: "s4".to_string(), status: ServerStatus::Up },
        ]
    }

    #[test]
    fn skips_down_servers() {
        let allocator = ServerAllocator::new();
        let chosen = allocator.allocate(&candidates(), 2).unwrap();
        assert!(chosen.iter().all(|s| s != "s2"));
    }

    #[test]
    fn errors_when_not_enough_up_servers() {
        let allocator = ServerAllocator::new();
        let err = allocator.allocate(&candidates(), 5).unwrap_err();
        assert_eq!(err, IngestError::InsufficientServers { available: 3, required: 5 });
    }

    #[test]
    fn rotates_start_position_across_calls() {
        let allocator = ServerAllocator::with_seed(0);
        let first = allocator.allocate(&candidates(), 1).unwrap();
        let second = allocator.allocate(&candidates(), 1).unwrap();
        assert_ne!(first, second);
    }
}
