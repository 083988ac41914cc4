//! `MetadataCoordinator`: owns the `(txid, seq)` timeline of every table's
//! metadata file and resolves `(namespace, table, key)` to a partition.

use crate::error::CoordinatorError;
use crate::transport::MetadataServerTransport;
use eventql_metadata::{Id160, KeyspaceKey, MetadataFile, PartitionMapEntry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTarget {
    pub partition_id: Id160,
    pub servers_for_insert: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, Hash)]
struct TableKey {
    namespace: String,
    table: String,
}

pub struct MetadataCoordinator {
    transport: Arc<dyn MetadataServerTransport>,
    /// Locally cached latest metadata file per table, used by `find_partition`
    /// before falling back to `fetch_latest`.
    cache: RwLock<HashMap<TableKey, Arc<MetadataFile>>>,
}

impl MetadataCoordinator {
    pub fn new(transport: Arc<dyn MetadataServerTransport>) -> Self {
        Self { transport, cache: RwLock::new(HashMap::new()) }
    }

    fn key(namespace: &str, table: &str) -> TableKey {
        TableKey { namespace: namespace.to_string(), table: table.to_string() }
    }

    /// Writes `file` to every server in `servers`; all must succeed. On
    /// partial success the servers that did accept it are rolled back via
    /// `delete`, and `QuorumFailed` is returned.
    pub async fn create_file(
        &self,
        namespace: &str,
        table: &str,
        file: MetadataFile,
        servers: &[String],
    ) -> Result<(), CoordinatorError> {
        let mut succeeded = Vec::new();
        for server in servers {
            match self.transport.put(server, namespace, table, file.clone()).await {
                Ok(()) => succeeded.push(server.clone()),
                Err(reason) => {
                    for done in &succeeded {
                        let _ = self.transport.delete(done, namespace, table, file.txid).await;
                    }
                    return Err(CoordinatorError::QuorumFailed {
                        context: format!("{namespace}/{table}: {reason}"),
                        succeeded: succeeded.len(),
                        required: servers.len(),
                    });
                }
            }
        }
        self.cache.write().insert(Self::key(namespace, table), Arc::new(file));
        Ok(())
    }

    /// Advances a table's timeline with a CAS check: `file` is only
    /// accepted by a server if its current view of the table is at
    /// `(prev_txid, prev_seq)`. Succeeds once a majority of `servers`
    /// accept it.
    pub async fn update_file(
        &self,
        namespace: &str,
        table: &str,
        prev_txid: Id160,
        file: MetadataFile,
        servers: &[String],
    ) -> Result<(), CoordinatorError> {
        let required = servers.len() / 2 + 1;
        let mut succeeded = 0usize;
        for server in servers {
            match self.transport.fetch(server, namespace, table, prev_txid).await {
                Ok(Some(_)) => match self.transport.put(server, namespace, table, file.clone()).await {
                    Ok(()) => succeeded += 1,
                    Err(_) => continue,
                },
                Ok(None) => continue,
                Err(_) => continue,
            }
        }
        if succeeded < required {
            return Err(CoordinatorError::BadVersion {
                context: format!("{namespace}/{table}: only {succeeded}/{required} servers advanced"),
            });
        }
        self.cache.write().insert(Self::key(namespace, table), Arc::new(file));
        Ok(())
    }

    /// Returns the locally cached file for a table, if any. Exposed so the
    /// Ingestion Router can check for a cache hit without contacting a
    /// server.
    pub fn cached(&self, namespace: &str, table: &str) -> Option<Arc<MetadataFile>> {
        self.cache.read().get(&Self::key(namespace, table)).cloned()
    }

    /// Contacts `servers` and returns the file with the greatest
    /// `(seq, txid)` known to any of them, refreshing the local cache.
    pub async fn fetch_latest(
        &self,
        namespace: &str,
        table: &str,
        servers: &[String],
    ) -> Result<Arc<MetadataFile>, CoordinatorError> {
        let mut best: Option<MetadataFile> = None;
        for server in servers {
            if let Ok(files) = self.transport.list(server, namespace, table).await {
                for file in files {
                    let better = match &best {
                        None => true,
                        Some(current) => (file.seq, file.txid.0) > (current.seq, current.txid.0),
                    };
                    if better {
                        best = Some(file);
                    }
                }
            }
        }
        let file = best.ok_or_else(|| CoordinatorError::NotFound {
            context: format!("no metadata file known for {namespace}/{table}"),
        })?;
        let file = Arc::new(file);
        self.cache.write().insert(Self::key(namespace, table), Arc::clone(&file));
        Ok(file)
    }

    /// Resolves an encoded partition key using the cached metadata file,
    /// refreshing from `servers` on a cache miss.
    pub async fn find_partition(
        &self,
        namespace: &str,
        table: &str,
        encoded_key: &KeyspaceKey,
        servers: &[String],
    ) -> Result<PartitionTarget, CoordinatorError> {
        let file = match self.cached(namespace, table) {
            Some(file) => file,
            None => self.fetch_latest(namespace, table, servers).await?,
        };
        let entry: &PartitionMapEntry = file.lookup(encoded_key)?;
        Ok(PartitionTarget {
            partition_id: entry.partition_id,
            servers_for_insert: servers_for_insert(entry),
        })
    }
}

/// A replica is a valid insert target while it's in the steady replica set,
/// or while it's actively joining; a server that's leaving keeps serving
/// reads but stops taking new writes once this list excludes it.
fn servers_for_insert(entry: &PartitionMapEntry) -> Vec<String> {
    let mut servers = entry.servers.clone();
    for joining in &entry.servers_joining {
        if !servers.contains(joining) {
            servers.push(joining.clone());
        }
    }
    servers.retain(|s| !entry.servers_leaving.contains(s));
    servers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalMetadataServerTransport;
    use eventql_metadata::{KeyspaceType, MetadataStore};
    use tempfile::tempdir;

    fn transport_with(servers: &[&str]) -> (Arc<LocalMetadataServerTransport>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let stores = servers
            .iter()
            .map(|s| (s.to_string(), Arc::new(MetadataStore::new(dir.path().join(s)))))
            .collect::<Vec<_>>();
        (Arc::new(LocalMetadataServerTransport::new(stores)), dir)
    }

    #[tokio::test]
    async fn create_file_requires_all_servers_to_succeed() {
        let (transport, _dir) = transport_with(&["s1", "s2"]);
        let coordinator = MetadataCoordinator::new(transport);
        let file = MetadataFile::new(
            Id160::from_sha1(b"txid-1"),
            1,
            KeyspaceType::Uint64,
            vec![PartitionMapEntry::new(KeyspaceKey::empty(), Id160::from_sha1(b"p0"), vec!["s1".to_string()])],
        );
        coordinator
            .create_file("ns1", "t1", file, &["s1".to_string(), "s2".to_string()])
            .await
            .unwrap();
        assert!(coordinator.cached("ns1", "t1").is_some());
    }

    #[tokio::test]
    async fn find_partition_resolves_via_cache_after_create() {
        let (transport, _dir) = transport_with(&["s1"]);
        let coordinator = MetadataCoordinator::new(Arc::clone(&transport));
        let p = Id160::from_sha1(b"p0");
        let file = MetadataFile::new(
            Id160::from_sha1(b"txid-1"),
            1,
            KeyspaceType::Uint64,
            vec![PartitionMapEntry::new(KeyspaceKey::empty(), p, vec!["s1".to_string()])],
        );
        coordinator.create_file("ns1", "t1", file, &["s1".to_string()]).await.unwrap();

        let key = KeyspaceType::encode_uint64(42);
        let target = coordinator.find_partition("ns1", "t1", &key, &["s1".to_string()]).await.unwrap();
        assert_eq!(target.partition_id, p);
        assert_eq!(target.servers_for_insert, vec!["s1".to_string()]);
    }
}
