//! Partition Map (component E): the local, in-memory index of partitions
//! owned by this server. Mirrors the teacher's `DashMap<String, Arc<RwLock<..>>>`
//! topic index, generalized from a flat topic name to a `(namespace, table)`
//! key with a nested partition id.

use crate::error::PartitionError;
use crate::writer::PartitionWriter;
use dashmap::DashMap;
use eventql_metadata::Id160;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub namespace: String,
    pub table: String,
}

impl TableKey {
    pub fn new(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), table: table.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartitionChangeKind {
    Created,
    Loaded,
    Unloaded,
    SplitStarted,
    SplitCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionChangeNotification {
    pub table: TableKey,
    pub partition_id: Id160,
    pub kind: PartitionChangeKind,
}

struct TableEntry {
    partitions: Vec<Arc<PartitionWriter>>,
}

/// Owns every partition writer this server currently holds, indexed by
/// table. External holders only ever get `Arc` snapshots; mutation always
/// goes through this map.
pub struct PartitionMap {
    tables: DashMap<TableKey, TableEntry>,
    subscribers: Mutex<Vec<Sender<PartitionChangeNotification>>>,
}

impl Default for PartitionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionMap {
    pub fn new() -> Self {
        Self { tables: DashMap::new(), subscribers: Mutex::new(Vec::new()) }
    }

    pub fn find_table(&self, key: &TableKey) -> Option<Vec<Arc<PartitionWriter>>> {
        self.tables.get(key).map(|entry| entry.partitions.clone())
    }

    pub fn find_partition(&self, key: &TableKey, partition_id: Id160) -> Result<Arc<PartitionWriter>, PartitionError> {
        let entry = self.tables.get(key).ok_or_else(|| PartitionError::TableNotFound {
            namespace: key.namespace.clone(),
            table: key.table.clone(),
        })?;
        entry
            .partitions
            .iter()
            .find(|p| p.partition_id() == partition_id)
            .cloned()
            .ok_or_else(|| PartitionError::PartitionNotFound { partition_id: partition_id.to_hex() })
    }

    /// Returns the existing writer for `partition_id`, or creates a brand
    /// new `UNLOADED` one and notifies subscribers once it is in place.
    pub fn find_or_create_partition(
        &self,
        key: &TableKey,
        partition_id: Id160,
        make: impl FnOnce() -> Arc<PartitionWriter>,
    ) -> Arc<PartitionWriter> {
        let mut created = false;
        let writer = {
            let mut entry = self.tables.entry(key.clone()).or_insert_with(|| TableEntry { partitions: Vec::new() });
            match entry.partitions.iter().find(|p| p.partition_id() == partition_id) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let writer = make();
                    entry.partitions.push(Arc::clone(&writer));
                    created = true;
                    writer
                }
            }
        };
        if created {
            self.notify(PartitionChangeNotification {
                table: key.clone(),
                partition_id,
                kind: PartitionChangeKind::Created,
            });
        }
        writer
    }

    pub fn remove_partition(&self, key: &TableKey, partition_id: Id160) {
        if let Some(mut entry) = self.tables.get_mut(key) {
            entry.partitions.retain(|p| p.partition_id() != partition_id);
        }
        self.notify(PartitionChangeNotification {
            table: key.clone(),
            partition_id,
            kind: PartitionChangeKind::Unloaded,
        });
    }

    pub fn list_tables(&self) -> Vec<TableKey> {
        self.tables.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn subscribe(&self) -> Receiver<PartitionChangeNotification> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Notifies subscribers. Called only after the triggering write (e.g. a
    /// partition create, or a manifest fsync) has been durably applied.
    pub fn notify(&self, notification: PartitionChangeNotification) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PartitionWriter;
    use tempfile::tempdir;

    fn writer(dir: &std::path::Path, id: Id160) -> Arc<PartitionWriter> {
        Arc::new(PartitionWriter::new(dir.join(id.to_hex()), id))
    }

    #[test]
    fn find_or_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let map = PartitionMap::new();
        let key = TableKey::new("ns1", "t1");
        let pid = Id160::from_sha1(b"p0");
        let w1 = map.find_or_create_partition(&key, pid, || writer(dir.path(), pid));
        let w2 = map.find_or_create_partition(&key, pid, || writer(dir.path(), pid));
        assert!(Arc::ptr_eq(&w1, &w2));
    }

    #[test]
    fn subscribers_observe_partition_creation() {
        let dir = tempdir().unwrap();
        let map = PartitionMap::new();
        let rx = map.subscribe();
        let key = TableKey::new("ns1", "t1");
        let pid = Id160::from_sha1(b"p0");
        map.find_or_create_partition(&key, pid, || writer(dir.path(), pid));
        let notification = rx.recv().unwrap();
        assert_eq!(notification.partition_id, pid);
        assert_eq!(notification.kind, PartitionChangeKind::Created);
    }

    #[test]
    fn find_partition_reports_missing_table() {
        let map = PartitionMap::new();
        let key = TableKey::new("ns1", "missing");
        let err = map.find_partition(&key, Id160::from_sha1(b"p0")).unwrap_err();
        assert!(err.is_not_found());
    }
}
