//! Internal wire message shapes for the two RPC boundaries this workspace
//! leaves unconnected to a real transport: the Ingestion Router's insert
//! dispatch to a remote partition, and the Metadata Coordinator's calls to
//! a remote metadata server. Actual framing (tonic, a length-prefixed
//! socket protocol, whatever) is an external collaborator; these structs
//! are the payload a concrete transport would carry over it.

use eventql_metadata::{Id160, MetadataFile};
use eventql_partition::{ColumnValue, IncomingRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireColumn {
    pub name: String,
    pub triples: Vec<(u8, u8, Option<Vec<u8>>)>,
}

impl From<&ColumnValue> for WireColumn {
    fn from(column: &ColumnValue) -> Self {
        WireColumn { name: column.name.clone(), triples: column.triples.clone() }
    }
}

impl From<WireColumn> for ColumnValue {
    fn from(column: WireColumn) -> Self {
        ColumnValue { name: column.name, triples: column.triples }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    pub id: Id160,
    pub sequence: u64,
    pub columns: Vec<WireColumn>,
}

impl From<&IncomingRecord> for WireRecord {
    fn from(record: &IncomingRecord) -> Self {
        WireRecord {
            id: record.id,
            sequence: record.sequence,
            columns: record.columns.iter().map(WireColumn::from).collect(),
        }
    }
}

impl From<WireRecord> for IncomingRecord {
    fn from(record: WireRecord) -> Self {
        IncomingRecord {
            id: record.id,
            sequence: record.sequence,
            columns: record.columns.into_iter().map(ColumnValue::from).collect(),
        }
    }
}

/// What the Ingestion Router would send a remote replica for one
/// `(partition_id, batch)` dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub namespace: String,
    pub table: String,
    pub partition_id: Id160,
    pub records: Vec<WireRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
    pub inserted_ids: Vec<Id160>,
}

/// Payloads for `MetadataServerTransport`'s `put`/`fetch`/`list` calls
/// against a remote metadata server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutMetadataFileRequest {
    pub namespace: String,
    pub table: String,
    pub file: MetadataFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetadataFileRequest {
    pub namespace: String,
    pub table: String,
    pub txid: Id160,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetadataFileResponse {
    pub file: Option<MetadataFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMetadataFilesRequest {
    pub namespace: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMetadataFilesResponse {
    pub files: Vec<MetadataFile>,
}
