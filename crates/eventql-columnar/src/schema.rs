//! Column schema descriptions shared by writers and readers.

use serde::{Deserialize, Serialize};

/// The interpreted type of a column's values. Distinct from `StorageType`:
/// a `DateTime` column, for instance, is stored as `Uint64` microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    Uint64,
    Int64,
    Double,
    String,
    Bool,
    DateTime,
}

/// The physical on-disk representation of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Uint64,
    Int64,
    Double,
    Bytes,
}

impl StorageType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            StorageType::Uint64 => 0,
            StorageType::Int64 => 1,
            StorageType::Double => 2,
            StorageType::Bytes => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StorageType::Uint64),
            1 => Some(StorageType::Int64),
            2 => Some(StorageType::Double),
            3 => Some(StorageType::Bytes),
            _ => None,
        }
    }
}

impl LogicalType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            LogicalType::Uint64 => 0,
            LogicalType::Int64 => 1,
            LogicalType::Double => 2,
            LogicalType::String => 3,
            LogicalType::Bool => 4,
            LogicalType::DateTime => 5,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(LogicalType::Uint64),
            1 => Some(LogicalType::Int64),
            2 => Some(LogicalType::Double),
            3 => Some(LogicalType::String),
            4 => Some(LogicalType::Bool),
            5 => Some(LogicalType::DateTime),
            _ => None,
        }
    }
}

/// Describes one column of a columnar file, including how deeply it can
/// be nested (`max_definition_level`) and repeated (`max_repetition_level`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    pub storage_type: StorageType,
    pub optional: bool,
    pub repeated: bool,
    /// Maximum definition level a value in this column can carry. A record with
    /// a null at depth d has dlvl = d; a fully present leaf has dlvl = max_definition_level.
    pub max_definition_level: u8,
    /// Maximum repetition level: how many repeated ancestors (inclusive) this column has.
    pub max_repetition_level: u8,
}

impl ColumnSpec {
    pub fn required(name: impl Into<String>, logical_type: LogicalType, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            storage_type,
            optional: false,
            repeated: false,
            max_definition_level: 0,
            max_repetition_level: 0,
        }
    }

    pub fn optional(name: impl Into<String>, logical_type: LogicalType, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            storage_type,
            optional: true,
            repeated: false,
            max_definition_level: 1,
            max_repetition_level: 0,
        }
    }

    pub fn repeated(name: impl Into<String>, logical_type: LogicalType, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            storage_type,
            optional: true,
            repeated: true,
            max_definition_level: 1,
            max_repetition_level: 1,
        }
    }
}
