//! Configuration documents stored under the cluster directory tree.

use crate::error::DirectoryError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub replication_factor: u32,
    /// Minimum number of replicas that must confirm an insert before it is
    /// acknowledged to the client.
    pub min_consistency: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "eventql".to_string(),
            replication_factor: 1,
            min_consistency: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServerStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub server_id: String,
    pub server_addr: String,
    #[serde(default)]
    pub status: Option<ServerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceConfig {
    pub namespace: String,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldType {
    Uint64,
    Int64,
    Double,
    String,
    Bool,
    DateTime,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaField {
    pub field_id: u32,
    pub name: String,
    pub field_type: FieldType,
    pub optional: bool,
    pub repeated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    pub table_name: String,
    pub fields: Vec<SchemaField>,
    pub primary_key: Vec<String>,
    /// Field ids only ever increase; a field id is never reused even after
    /// its column is dropped, so stale data under an old id can't collide
    /// with a later field of the same name.
    pub next_field_id: u32,
    /// Bumped by every successful `update_table_config`, including the
    /// implicit one performed by `CREATE TABLE` and `ALTER TABLE`.
    pub version: u64,
}

impl TableDefinition {
    pub fn new(table_name: impl Into<String>, primary_key: Vec<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Vec::new(),
            primary_key,
            next_field_id: 1,
            version: 0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Applies a schema change in place, enforcing that primary-key columns
    /// cannot be dropped and, once the change lands, that every primary-key
    /// column is still a flat, non-repeated, non-OBJECT field.
    pub fn apply(&mut self, op: &AlterTableOperation) -> Result<(), DirectoryError> {
        match op {
            AlterTableOperation::AddField { name, field_type, optional, repeated } => {
                let field_id = self.next_field_id;
                self.next_field_id += 1;
                self.fields.push(SchemaField {
                    field_id,
                    name: name.clone(),
                    field_type: *field_type,
                    optional: *optional,
                    repeated: *repeated,
                });
            }
            AlterTableOperation::RemoveField { name } => {
                if self.primary_key.iter().any(|pk| pk == name) {
                    return Err(DirectoryError::IllegalArgument {
                        reason: format!("cannot drop primary key column {name}"),
                    });
                }
                self.fields.retain(|f| &f.name != name);
            }
        }
        self.validate_primary_key()?;
        self.version += 1;
        Ok(())
    }

    /// Primary-key columns must be flat (no `.` path into a nested OBJECT)
    /// and, where the column resolves to a declared field, neither OBJECT
    /// nor repeated. A primary key added before its backing field exists
    /// (e.g. the table's implicit base columns) is only checked for the
    /// nested-path rule, since there's no field to inspect yet.
    fn validate_primary_key(&self) -> Result<(), DirectoryError> {
        for pk in &self.primary_key {
            if pk.contains('.') {
                return Err(DirectoryError::IllegalArgument {
                    reason: format!("primary key column '{pk}' may not be a nested path"),
                });
            }
            if let Some(field) = self.field(pk) {
                if field.field_type == FieldType::Object || field.repeated {
                    return Err(DirectoryError::IllegalArgument {
                        reason: format!("primary key column '{pk}' must not be OBJECT-typed or repeated"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableOperation {
    AddField { name: String, field_type: FieldType, optional: bool, repeated: bool },
    RemoveField { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotted_primary_key_column() {
        let mut table = TableDefinition::new("t1", vec!["meta.id".to_string()]);
        let err = table
            .apply(&AlterTableOperation::AddField { name: "v".to_string(), field_type: FieldType::Uint64, optional: false, repeated: false })
            .unwrap_err();
        assert!(matches!(err, DirectoryError::IllegalArgument { .. }));
    }

    #[test]
    fn rejects_object_typed_primary_key_column() {
        let mut table = TableDefinition::new("t1", vec!["id".to_string()]);
        let err = table
            .apply(&AlterTableOperation::AddField { name: "id".to_string(), field_type: FieldType::Object, optional: false, repeated: false })
            .unwrap_err();
        assert!(matches!(err, DirectoryError::IllegalArgument { .. }));
    }

    #[test]
    fn rejects_repeated_primary_key_column() {
        let mut table = TableDefinition::new("t1", vec!["id".to_string()]);
        let err = table
            .apply(&AlterTableOperation::AddField { name: "id".to_string(), field_type: FieldType::Uint64, optional: false, repeated: true })
            .unwrap_err();
        assert!(matches!(err, DirectoryError::IllegalArgument { .. }));
    }

    #[test]
    fn unresolved_primary_key_column_is_allowed_until_it_resolves_to_a_bad_field() {
        // "ts"/"id" style implicit base columns never get an AddField call;
        // they must not be rejected just because `field()` can't find them.
        let mut table = TableDefinition::new("t1", vec!["ts".to_string(), "id".to_string()]);
        table
            .apply(&AlterTableOperation::AddField { name: "v".to_string(), field_type: FieldType::Uint64, optional: false, repeated: false })
            .unwrap();
        assert_eq!(table.version, 1);
    }
}
