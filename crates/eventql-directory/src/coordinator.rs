//! The `CoordinatorClient` trait models the strongly-consistent external
//! service (ZooKeeper/etcd-shaped) that `ClusterDirectory` builds on: a tree
//! of versioned nodes, ephemeral nodes tied to a session, and one-shot
//! watches that must be re-armed after they fire.
//!
//! This trait is synchronous. The directory itself is a thin, mostly
//! in-memory cache over the coordinator and never needs to hold a node lock
//! across an await point, so a blocking trait keeps `LocalCoordinator` (and
//! any future real backend) simple to test without pulling in a runtime.

use crate::error::DirectoryError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDataChanged,
    NodeDeleted,
    NodeChildrenChanged,
    SessionExpired,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchEventKind,
}

/// A one-shot watch callback. Fires at most once; the caller must re-install
/// it (via another `get`/`list_children` call) to keep watching.
pub type Watcher = Arc<dyn Fn(WatchEvent) + Send + Sync>;

pub trait CoordinatorClient: Send + Sync {
    fn create(&self, path: &str, data: Vec<u8>, ephemeral: bool) -> Result<(), DirectoryError>;

    /// Compare-and-set write. `expected_version` of `None` means "create or
    /// overwrite unconditionally"; `Some(v)` fails with `BadVersion` unless
    /// the node is currently at version `v`. Returns the new version.
    fn set(&self, path: &str, data: Vec<u8>, expected_version: Option<u64>) -> Result<u64, DirectoryError>;

    fn get(&self, path: &str, watch: Option<Watcher>) -> Result<(Vec<u8>, u64), DirectoryError>;

    fn list_children(&self, path: &str, watch: Option<Watcher>) -> Result<Vec<String>, DirectoryError>;

    fn exists(&self, path: &str) -> Result<bool, DirectoryError>;

    fn delete(&self, path: &str) -> Result<(), DirectoryError>;
}

struct NodeRecord {
    data: Vec<u8>,
    version: u64,
    ephemeral: bool,
}

struct Tree {
    nodes: HashMap<String, NodeRecord>,
    data_watchers: HashMap<String, Vec<Watcher>>,
    child_watchers: HashMap<String, Vec<Watcher>>,
}

/// In-memory coordinator used for bootstrap, single-node clusters, and
/// tests. Ephemeral nodes are removed by calling `close_session`, mirroring
/// what a real backend does when a client's session expires.
pub struct LocalCoordinator {
    tree: Mutex<Tree>,
}

impl Default for LocalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCoordinator {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            NodeRecord { data: Vec::new(), version: 0, ephemeral: false },
        );
        Self {
            tree: Mutex::new(Tree {
                nodes,
                data_watchers: HashMap::new(),
                child_watchers: HashMap::new(),
            }),
        }
    }

    fn parent_of(path: &str) -> Option<String> {
        if path == "/" {
            return None;
        }
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(trimmed[..idx].to_string()),
            None => None,
        }
    }

    /// Closes out ephemeral nodes as if the owning session expired, firing
    /// `NodeDeleted`/`NodeChildrenChanged` watches along the way.
    pub fn expire_session(&self) {
        let fired = {
            let mut tree = self.tree.lock();
            let dead: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(path, rec)| rec.ephemeral && path.as_str() != "/")
                .map(|(path, _)| path.clone())
                .collect();
            let mut fired = Vec::new();
            for path in dead {
                tree.nodes.remove(&path);
                fired.extend(take_watchers(&mut tree.data_watchers, &path, WatchEventKind::SessionExpired));
                if let Some(parent) = Self::parent_of(&path) {
                    fired.extend(take_watchers(&mut tree.child_watchers, &parent, WatchEventKind::NodeChildrenChanged));
                }
            }
            fired
        };
        dispatch(fired);
    }
}

/// Removes and returns the watchers registered on `path`, pairing each with
/// the event it should fire. One-shot: a watcher not re-registered by its own
/// callback will not be in the map on the next change.
fn take_watchers(watchers: &mut HashMap<String, Vec<Watcher>>, path: &str, kind: WatchEventKind) -> Vec<(Watcher, WatchEvent)> {
    watchers
        .remove(path)
        .unwrap_or_default()
        .into_iter()
        .map(|w| (w, WatchEvent { path: path.to_string(), kind }))
        .collect()
}

/// Invokes fired watchers outside any lock. A watcher's callback is free to
/// call back into this same `LocalCoordinator` (e.g. to re-arm itself, the
/// one-shot contract requires exactly that) without deadlocking on its own
/// tree mutex.
fn dispatch(fired: Vec<(Watcher, WatchEvent)>) {
    for (w, evt) in fired {
        w(evt);
    }
}

impl CoordinatorClient for LocalCoordinator {
    fn create(&self, path: &str, data: Vec<u8>, ephemeral: bool) -> Result<(), DirectoryError> {
        let fired = {
            let mut tree = self.tree.lock();
            if tree.nodes.contains_key(path) {
                return Err(DirectoryError::AlreadyExists { context: path.to_string() });
            }
            if let Some(parent) = Self::parent_of(path) {
                if !tree.nodes.contains_key(&parent) {
                    return Err(DirectoryError::NotFound { context: parent });
                }
            }
            tree.nodes.insert(path.to_string(), NodeRecord { data, version: 0, ephemeral });
            let mut fired = take_watchers(&mut tree.data_watchers, path, WatchEventKind::NodeCreated);
            if let Some(parent) = Self::parent_of(path) {
                fired.extend(take_watchers(&mut tree.child_watchers, &parent, WatchEventKind::NodeChildrenChanged));
            }
            fired
        };
        dispatch(fired);
        Ok(())
    }

    fn set(&self, path: &str, data: Vec<u8>, expected_version: Option<u64>) -> Result<u64, DirectoryError> {
        let (new_version, fired) = {
            let mut tree = self.tree.lock();
            let current_version = tree.nodes.get(path).map(|n| n.version);
            match (expected_version, current_version) {
                (_, None) => return Err(DirectoryError::NotFound { context: path.to_string() }),
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(DirectoryError::BadVersion { context: path.to_string(), expected, actual });
                }
                (_, Some(actual)) => {
                    let new_version = actual + 1;
                    if let Some(node) = tree.nodes.get_mut(path) {
                        node.data = data;
                        node.version = new_version;
                    }
                    let fired = take_watchers(&mut tree.data_watchers, path, WatchEventKind::NodeDataChanged);
                    (new_version, fired)
                }
            }
        };
        dispatch(fired);
        Ok(new_version)
    }

    fn get(&self, path: &str, watch: Option<Watcher>) -> Result<(Vec<u8>, u64), DirectoryError> {
        let mut tree = self.tree.lock();
        let node = tree.nodes.get(path).ok_or_else(|| DirectoryError::NotFound { context: path.to_string() })?;
        let result = (node.data.clone(), node.version);
        if let Some(w) = watch {
            tree.data_watchers.entry(path.to_string()).or_default().push(w);
        }
        Ok(result)
    }

    fn list_children(&self, path: &str, watch: Option<Watcher>) -> Result<Vec<String>, DirectoryError> {
        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(path) {
            return Err(DirectoryError::NotFound { context: path.to_string() });
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut children: Vec<String> = tree
            .nodes
            .keys()
            .filter_map(|candidate| {
                let rest = candidate.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        children.sort();
        if let Some(w) = watch {
            tree.child_watchers.entry(path.to_string()).or_default().push(w);
        }
        Ok(children)
    }

    fn exists(&self, path: &str) -> Result<bool, DirectoryError> {
        Ok(self.tree.lock().nodes.contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<(), DirectoryError> {
        let fired = {
            let mut tree = self.tree.lock();
            if tree.nodes.remove(path).is_none() {
                return Err(DirectoryError::NotFound { context: path.to_string() });
            }
            let mut fired = take_watchers(&mut tree.data_watchers, path, WatchEventKind::NodeDeleted);
            if let Some(parent) = Self::parent_of(path) {
                fired.extend(take_watchers(&mut tree.child_watchers, &parent, WatchEventKind::NodeChildrenChanged));
            }
            fired
        };
        dispatch(fired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn create_then_get_round_trips() {
        let coord = LocalCoordinator::new();
        coord.create("/config", b"hello".to_vec(), false).unwrap();
        let (data, version) = coord.get("/config", None).unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(version, 0);
    }

    #[test]
    fn set_rejects_stale_version() {
        let coord = LocalCoordinator::new();
        coord.create("/config", b"v0".to_vec(), false).unwrap();
        coord.set("/config", b"v1".to_vec(), Some(0)).unwrap();
        let err = coord.set("/config", b"v2".to_vec(), Some(0)).unwrap_err();
        assert!(matches!(err, DirectoryError::BadVersion { .. }));
    }

    #[test]
    fn watch_fires_once_then_must_be_rearmed() {
        let coord = LocalCoordinator::new();
        coord.create("/config", b"v0".to_vec(), false).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let (_, version) = coord
            .get("/config", Some(Arc::new(move |_evt| { fired2.fetch_add(1, Ordering::SeqCst); })))
            .unwrap();
        coord.set("/config", b"v1".to_vec(), Some(version)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // second change does not re-fire because the watch wasn't reinstalled
        coord.set("/config", b"v2".to_vec(), Some(version + 1)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ephemeral_nodes_removed_on_session_expiry() {
        let coord = LocalCoordinator::new();
        coord.create("/servers-live/s1", Vec::new(), true).unwrap();
        assert!(coord.exists("/servers-live/s1").unwrap());
        coord.expire_session();
        assert!(!coord.exists("/servers-live/s1").unwrap());
    }

    #[test]
    fn list_children_only_returns_direct_descendants() {
        let coord = LocalCoordinator::new();
        coord.create("/namespaces", Vec::new(), false).unwrap();
        coord.create("/namespaces/ns1", Vec::new(), false).unwrap();
        coord.create("/namespaces/ns1/tables", Vec::new(), false).unwrap();
        let children = coord.list_children("/namespaces", None).unwrap();
        assert_eq!(children, vec!["ns1".to_string()]);
    }

    #[test]
    fn create_requires_existing_parent() {
        let coord = LocalCoordinator::new();
        let err = coord.create("/namespaces/ns1", Vec::new(), false).unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { .. }));
    }
}
