//! Ingestion Router (component H): batches a record stream by partition and
//! fans the batches out to every replica in parallel.

use crate::error::IngestError;
use async_trait::async_trait;
use eventql_coordinator::MetadataCoordinator;
use eventql_metadata::{Id160, KeyspaceKey, KeyspaceType, PartitionerType};
use eventql_partition::{ColumnValue, IncomingRecord, TableKey};
use std::collections::HashMap;
use std::sync::Arc;

/// A record presented to the router: column name to already-encoded raw
/// bytes. Logical-type encoding is the caller's responsibility; the router
/// only needs to read the primary-key and partition-key columns.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub fields: HashMap<String, Vec<u8>>,
}

impl RawRecord {
    fn field(&self, name: &str) -> Result<&Vec<u8>, IngestError> {
        self.fields.get(name).ok_or_else(|| IngestError::MissingField { field: name.to_string() })
    }
}

/// Per-table routing parameters: which columns form the primary key, and
/// how to derive the partition key from the table's designated
/// partition-key field.
#[derive(Debug, Clone)]
pub struct TableRoutingConfig {
    pub namespace: String,
    pub table: String,
    /// Column names forming the primary key, in declaration order.
    /// `primary_key[0]` is also the partition key, per the table
    /// definition's invariant.
    pub primary_key: Vec<String>,
    pub partitioner: PartitionerType,
    /// Required when `partitioner` is `TimeWindow`.
    pub window_micros: Option<u64>,
}

impl TableRoutingConfig {
    fn table_key(&self) -> TableKey {
        TableKey::new(self.namespace.clone(), self.table.clone())
    }

    fn partition_key_field(&self) -> &str {
        &self.primary_key[0]
    }
}

/// The per-server, per-partition insert backend the router dispatches to.
/// `LocalInsertTarget` is the only implementation this workspace carries;
/// a remote implementation would serialize `batch` over the internal
/// insert transport, which is out of scope here.
#[async_trait]
pub trait InsertTarget: Send + Sync {
    fn next_sequence(&self, table: &TableKey, partition_id: Id160) -> Result<u64, IngestError>;
    async fn insert(
        &self,
        server: &str,
        table: &TableKey,
        partition_id: Id160,
        batch: Vec<IncomingRecord>,
    ) -> Result<(), IngestError>;
}

/// Dispatches directly into an in-process `PartitionMap`. Only accepts
/// inserts addressed to `local_server_id`; anything else fails as if the
/// replica were unreachable, since this workspace implements no remote
/// insert transport.
pub struct LocalInsertTarget {
    local_server_id: String,
    partitions: Arc<eventql_partition::PartitionMap>,
}

impl LocalInsertTarget {
    pub fn new(local_server_id: impl Into<String>, partitions: Arc<eventql_partition::PartitionMap>) -> Self {
        Self { local_server_id: local_server_id.into(), partitions }
    }
}

#[async_trait]
impl InsertTarget for LocalInsertTarget {
    fn next_sequence(&self, table: &TableKey, partition_id: Id160) -> Result<u64, IngestError> {
        Ok(self.partitions.find_partition(table, partition_id)?.next_sequence())
    }

    async fn insert(
        &self,
        server: &str,
        table: &TableKey,
        partition_id: Id160,
        batch: Vec<IncomingRecord>,
    ) -> Result<(), IngestError> {
        if server != self.local_server_id {
            return Err(IngestError::Partition(eventql_partition::PartitionError::PartitionNotFound {
                partition_id: partition_id.to_hex(),
            }));
        }
        self.partitions.find_partition(table, partition_id)?.append(batch)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub confirmed: usize,
    pub attempted: usize,
}

pub struct IngestionRouter {
    coordinator: Arc<MetadataCoordinator>,
    target: Arc<dyn InsertTarget>,
    /// Servers to contact for `find_partition`'s cache-miss fallback.
    bootstrap_servers: Vec<String>,
    min_consistency: u32,
}

impl IngestionRouter {
    pub fn new(
        coordinator: Arc<MetadataCoordinator>,
        target: Arc<dyn InsertTarget>,
        bootstrap_servers: Vec<String>,
        min_consistency: u32,
    ) -> Self {
        Self { coordinator, target, bootstrap_servers, min_consistency }
    }

    /// Computes the 160-bit primary-key hash: a single PK column hashes its
    /// raw bytes directly; multiple columns left-fold
    /// `sha1(prev.bytes || sha1(col_i))`.
    fn primary_key_hash(columns: &[String], record: &RawRecord) -> Result<Id160, IngestError> {
        let mut iter = columns.iter();
        let first = iter.next().expect("primary_key has at least one column");
        let mut acc = Id160::from_sha1(record.field(first)?);
        for name in iter {
            let col_hash = Id160::from_sha1(record.field(name)?);
            let mut combined = acc.0.to_vec();
            combined.extend_from_slice(&col_hash.0);
            acc = Id160::from_sha1(&combined);
        }
        Ok(acc)
    }

    /// Encodes the partition-routing key from the table's partition-key
    /// field, distinct from the primary-key hash above: this value is fed
    /// into the metadata file's keyspace comparator, not into the LSM's
    /// per-row identity.
    fn partition_key(routing: &TableRoutingConfig, record: &RawRecord) -> Result<KeyspaceKey, IngestError> {
        let raw = record.field(routing.partition_key_field())?;
        match routing.partitioner {
            PartitionerType::TimeWindow => {
                let window = routing.window_micros.unwrap_or(1_000_000);
                let mut buf = [0u8; 8];
                let len = raw.len().min(8);
                buf[..len].copy_from_slice(&raw[..len]);
                Ok(PartitionerType::time_window_key(u64::from_be_bytes(buf), window))
            }
            PartitionerType::Uint64 => {
                let mut buf = [0u8; 8];
                let len = raw.len().min(8);
                buf[..len].copy_from_slice(&raw[..len]);
                Ok(KeyspaceType::encode_uint64(u64::from_be_bytes(buf)))
            }
            PartitionerType::String => Ok(KeyspaceKey(raw.clone())),
        }
    }

    /// Routes and inserts a batch of records for one table: groups by
    /// resolved partition, dispatches every partition's batch to every one
    /// of its `servers_for_insert` in parallel, and requires at least
    /// `min_consistency` replicas to confirm.
    pub async fn insert(&self, routing: &TableRoutingConfig, records: Vec<RawRecord>) -> Result<InsertOutcome, IngestError> {
        let table_key = routing.table_key();
        let mut batches: HashMap<Id160, (Vec<String>, Vec<IncomingRecord>)> = HashMap::new();

        for record in records {
            let id = Self::primary_key_hash(&routing.primary_key, &record)?;
            let key = Self::partition_key(routing, &record)?;
            let resolved = self
                .coordinator
                .find_partition(&routing.namespace, &routing.table, &key, &self.bootstrap_servers)
                .await?;
            let sequence = self.target.next_sequence(&table_key, resolved.partition_id)?;
            let mut columns: Vec<ColumnValue> = record
                .fields
                .into_iter()
                .map(|(name, value)| ColumnValue { name, triples: vec![(0, 0, Some(value))] })
                .collect();
            // Every table schema carries these three synthetic columns
            // alongside its declared fields: `__lsm_id` backs compaction's
            // merge-by-key comparator, `__lsm_sequence` backs its tie-break
            // on conflicting ids, and `__lsm_is_update` distinguishes a fresh
            // insert from a future upsert path. This router only inserts, so
            // it's always `0`.
            columns.push(ColumnValue { name: "__lsm_id".to_string(), triples: vec![(0, 0, Some(id.0.to_vec()))] });
            columns.push(ColumnValue {
                name: "__lsm_sequence".to_string(),
                triples: vec![(0, 0, Some(sequence.to_be_bytes().to_vec()))],
            });
            columns.push(ColumnValue {
                name: "__lsm_is_update".to_string(),
                triples: vec![(0, 0, Some(0u64.to_be_bytes().to_vec()))],
            });
            let entry = batches
                .entry(resolved.partition_id)
                .or_insert_with(|| (resolved.servers_for_insert.clone(), Vec::new()));
            entry.1.push(IncomingRecord { id, sequence, columns });
        }

        let mut dispatches = Vec::new();
        for (partition_id, (servers, batch)) in batches {
            for server in servers {
                let target = Arc::clone(&self.target);
                let table_key = table_key.clone();
                let batch = batch.clone();
                dispatches.push(async move { target.insert(&server, &table_key, partition_id, batch).await });
            }
        }

        let attempted = dispatches.len();
        let results = futures_util::future::join_all(dispatches).await;
        let confirmed = results.iter().filter(|r| r.is_ok()).count();
        if confirmed < self.min_consistency as usize {
            return Err(IngestError::ConsistencyNotMet { confirmed, required: self.min_consistency as usize });
        }
        Ok(InsertOutcome { confirmed, attempted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventql_coordinator::transport::LocalMetadataServerTransport;
    use eventql_metadata::{KeyspaceType as Ks, MetadataFile, MetadataStore, PartitionMapEntry};
    use eventql_partition::PartitionMap;
    use tempfile::tempdir;

    fn field(v: &[u8]) -> Vec<u8> {
        v.to_vec()
    }

    async fn setup(dir: &std::path::Path, partition_id: Id160, servers: Vec<String>) -> (Arc<MetadataCoordinator>, Arc<PartitionMap>) {
        let store = Arc::new(MetadataStore::new(dir.join("meta")));
        let transport = Arc::new(LocalMetadataServerTransport::new(vec![("s1".to_string(), store)]));
        let coordinator = Arc::new(MetadataCoordinator::new(transport));
        let file = MetadataFile::new(
            Id160::from_sha1(b"txid-1"),
            1,
            Ks::Uint64,
            vec![PartitionMapEntry::new(KeyspaceKey::empty(), partition_id, servers)],
        );
        coordinator.create_file("ns1", "events", file, &["s1".to_string()]).await.unwrap();

        let schema = vec![
            eventql_columnar::schema::ColumnSpec::required("__lsm_id", eventql_columnar::schema::LogicalType::String, eventql_columnar::schema::StorageType::Bytes),
            eventql_columnar::schema::ColumnSpec::required("__lsm_sequence", eventql_columnar::schema::LogicalType::Uint64, eventql_columnar::schema::StorageType::Uint64),
            eventql_columnar::schema::ColumnSpec::required("__lsm_is_update", eventql_columnar::schema::LogicalType::Bool, eventql_columnar::schema::StorageType::Uint64),
            eventql_columnar::schema::ColumnSpec::required("ts", eventql_columnar::schema::LogicalType::Uint64, eventql_columnar::schema::StorageType::Uint64),
            eventql_columnar::schema::ColumnSpec::required("id", eventql_columnar::schema::LogicalType::String, eventql_columnar::schema::StorageType::Bytes),
        ];
        let partitions = Arc::new(PartitionMap::new());
        let key = TableKey::new("ns1", "events");
        let writer_dir = dir.join("p");
        let writer = partitions.find_or_create_partition(&key, partition_id, || {
            Arc::new(eventql_partition::PartitionWriter::new(writer_dir.clone(), partition_id))
        });
        writer.load(schema).unwrap();
        (coordinator, partitions)
    }

    fn record(ts: u64, id: &str) -> RawRecord {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), field(id.as_bytes()));
        fields.insert("ts".to_string(), field(&ts.to_be_bytes()));
        RawRecord { fields }
    }

    #[tokio::test]
    async fn routes_and_inserts_into_local_partition() {
        let dir = tempdir().unwrap();
        let partition_id = Id160::from_sha1(b"p0");
        let (coordinator, partitions) = setup(dir.path(), partition_id, vec!["local".to_string()]).await;
        let target = Arc::new(LocalInsertTarget::new("local", Arc::clone(&partitions)));
        let router = IngestionRouter::new(coordinator, target, vec!["s1".to_string()], 1);

        let routing = TableRoutingConfig {
            namespace: "ns1".to_string(),
            table: "events".to_string(),
            primary_key: vec!["id".to_string()],
            partitioner: PartitionerType::Uint64,
            window_micros: None,
        };
        let outcome = router.insert(&routing, vec![record(1, "row-a"), record(2, "row-b")]).await.unwrap();
        assert_eq!(outcome, InsertOutcome { confirmed: 1, attempted: 1 });

        let key = TableKey::new("ns1", "events");
        let writer = partitions.find_partition(&key, partition_id).unwrap();
        assert_eq!(writer.row_count(), 2);
    }

    #[tokio::test]
    async fn missing_partition_key_field_is_rejected() {
        let dir = tempdir().unwrap();
        let partition_id = Id160::from_sha1(b"p0");
        let (coordinator, partitions) = setup(dir.path(), partition_id, vec!["local".to_string()]).await;
        let target = Arc::new(LocalInsertTarget::new("local", partitions));
        let router = IngestionRouter::new(coordinator, target, vec!["s1".to_string()], 1);
        let routing = TableRoutingConfig {
            namespace: "ns1".to_string(),
            table: "events".to_string(),
            primary_key: vec!["id".to_string()],
            partitioner: PartitionerType::Uint64,
            window_micros: None,
        };
        let mut fields = HashMap::new();
        fields.insert("ts".to_string(), field(&1u64.to_be_bytes()));
        let err = router.insert(&routing, vec![RawRecord { fields }]).await.unwrap_err();
        assert_eq!(err, IngestError::MissingField { field: "id".to_string() });
    }

    #[tokio::test]
    async fn one_of_three_replicas_confirm_satisfies_min_consistency_one() {
        let dir = tempdir().unwrap();
        let partition_id = Id160::from_sha1(b"p0");
        // "remote-1" and "remote-2" aren't wired to any insert transport in
        // this workspace, so they fail every dispatch; only "local"
        // confirms. With min_consistency = 1 that's still enough.
        let servers = vec!["local".to_string(), "remote-1".to_string(), "remote-2".to_string()];
        let (coordinator, partitions) = setup(dir.path(), partition_id, servers).await;
        let target = Arc::new(LocalInsertTarget::new("local", partitions));
        let router = IngestionRouter::new(coordinator, target, vec!["s1".to_string()], 1);
        let routing = TableRoutingConfig {
            namespace: "ns1".to_string(),
            table: "events".to_string(),
            primary_key: vec!["id".to_string()],
            partitioner: PartitionerType::Uint64,
            window_micros: None,
        };
        let outcome = router.insert(&routing, vec![record(1, "row-a")]).await.unwrap();
        assert_eq!(outcome.confirmed, 1);
        assert_eq!(outcome.attempted, 3);
    }

    #[tokio::test]
    async fn insufficient_confirmations_is_an_error() {
        let dir = tempdir().unwrap();
        let partition_id = Id160::from_sha1(b"p0");
        let servers = vec!["local".to_string(), "remote-1".to_string()];
        let (coordinator, partitions) = setup(dir.path(), partition_id, servers).await;
        let target = Arc::new(LocalInsertTarget::new("local", partitions));
        // This cluster's min_consistency is 2, but only "local" can ever confirm.
        let router = IngestionRouter::new(coordinator, target, vec!["s1".to_string()], 2);
        let routing = TableRoutingConfig {
            namespace: "ns1".to_string(),
            table: "events".to_string(),
            primary_key: vec!["id".to_string()],
            partitioner: PartitionerType::Uint64,
            window_micros: None,
        };
        let err = router.insert(&routing, vec![record(1, "row-a")]).await.unwrap_err();
        assert_eq!(err, IngestError::ConsistencyNotMet { confirmed: 1, required: 2 });
    }
}
