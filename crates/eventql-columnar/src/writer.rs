//! Per-column writers and the file-level writer that synchronises them at row
//! boundaries.

use crate::error::ColumnarError;
use crate::framing::{write_bytes, write_u32, write_u64, write_u8, FORMAT_VERSION, MAGIC};
use crate::schema::ColumnSpec;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A single `(repetition_level, definition_level, value)` triple buffered for one column.
struct Triple {
    rlvl: u8,
    dlvl: u8,
    value: Option<Vec<u8>>,
}

/// Buffers triples for one column until `commit()` serialises them.
pub struct ColumnWriter {
    spec: ColumnSpec,
    triples: Vec<Triple>,
    /// Number of triples written since the last `add_row()` call.
    pending_in_row: usize,
}

impl ColumnWriter {
    fn new(spec: ColumnSpec) -> Self {
        Self {
            spec,
            triples: Vec::new(),
            pending_in_row: 0,
        }
    }

    pub fn write(&mut self, rlvl: u8, dlvl: u8, value: Option<&[u8]>) {
        self.triples.push(Triple {
            rlvl,
            dlvl,
            value: value.map(|v| v.to_vec()),
        });
        self.pending_in_row += 1;
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

/// Writes a schema-described columnar file, enforcing that every logical row
/// touches every column exactly once (`add_row()` is the synchronisation point).
pub struct FileWriter {
    path: PathBuf,
    order: Vec<String>,
    columns: HashMap<String, ColumnWriter>,
    row_count: u64,
    sealed: bool,
}

impl FileWriter {
    pub fn create<P: AsRef<Path>>(path: P, schema: Vec<ColumnSpec>) -> Result<Self, ColumnarError> {
        let order = schema.iter().map(|c| c.name.clone()).collect();
        let columns = schema
            .into_iter()
            .map(|spec| (spec.name.clone(), ColumnWriter::new(spec)))
            .collect();
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            order,
            columns,
            row_count: 0,
            sealed: false,
        })
    }

    pub fn column_writer(&mut self, name: &str) -> Result<&mut ColumnWriter, ColumnarError> {
        self.columns
            .get_mut(name)
            .ok_or_else(|| ColumnarError::ColumnNotFound { name: name.to_string() })
    }

    /// Marks the end of a logical row. Every column must have received at
    /// least one triple since the previous row boundary.
    pub fn add_row(&mut self) -> Result<(), ColumnarError> {
        if self.sealed {
            return Err(ColumnarError::IllegalState {
                context: "add_row() called after commit()".to_string(),
            });
        }
        for name in &self.order {
            let column = self.columns.get(name).expect("column in order exists");
            if column.pending_in_row == 0 {
                return Err(ColumnarError::IllegalState {
                    context: format!("column '{name}' received no value for this row"),
                });
            }
        }
        for column in self.columns.values_mut() {
            column.pending_in_row = 0;
        }
        self.row_count += 1;
        Ok(())
    }

    /// Flushes all buffered columns to disk and seals the file. Idempotent:
    /// calling `commit()` twice is a no-op after the first successful call.
    pub fn commit(&mut self) -> Result<(), ColumnarError> {
        if self.sealed {
            return Ok(());
        }
        let file = File::create(&self.path)
            .map_err(|e| ColumnarError::from_io_error(e, "creating columnar file"))?;
        let mut out = BufWriter::new(file);

        write_u32(&mut out, MAGIC, "magic")?;
        write_u32(&mut out, FORMAT_VERSION, "format version")?;
        write_u32(&mut out, self.order.len() as u32, "column count")?;
        write_u64(&mut out, self.row_count, "row count")?;

        // Directory: one entry per column, then the data blocks in the same order.
        for name in &self.order {
            let column = &self.columns[name];
            write_bytes(&mut out, name.as_bytes(), "column name")?;
            write_u8(&mut out, column.spec.logical_type.tag(), "logical type")?;
            write_u8(&mut out, column.spec.storage_type.tag(), "storage type")?;
            write_u8(&mut out, column.spec.optional as u8, "optional flag")?;
            write_u8(&mut out, column.spec.repeated as u8, "repeated flag")?;
            write_u8(&mut out, column.spec.max_definition_level, "max dlvl")?;
            write_u8(&mut out, column.spec.max_repetition_level, "max rlvl")?;
            write_u64(&mut out, column.triples.len() as u64, "triple count")?;
        }

        for name in &self.order {
            let column = &self.columns[name];
            for triple in &column.triples {
                write_u8(&mut out, triple.rlvl, "rlvl")?;
                write_u8(&mut out, triple.dlvl, "dlvl")?;
                match &triple.value {
                    Some(v) => {
                        write_u8(&mut out, 1, "has_value")?;
                        write_bytes(&mut out, v, "value")?;
                    }
                    None => write_u8(&mut out, 0, "has_value")?,
                }
            }
        }

        out.flush().map_err(|e| ColumnarError::from_io_error(e, "flushing columnar file"))?;
        self.sealed = true;
        Ok(())
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogicalType, StorageType};
    use tempfile::tempdir;

    fn schema() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::required("a", LogicalType::Uint64, StorageType::Uint64),
            ColumnSpec::repeated("b", LogicalType::String, StorageType::Bytes),
        ]
    }

    #[test]
    fn add_row_requires_every_column() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::create(dir.path().join("f.cst"), schema()).unwrap();
        writer.column_writer("a").unwrap().write(0, 0, Some(&1u64.to_be_bytes()));
        let err = writer.add_row().unwrap_err();
        assert!(matches!(err, ColumnarError::IllegalState { .. }));
    }

    #[test]
    fn commit_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::create(dir.path().join("f.cst"), schema()).unwrap();
        writer.column_writer("a").unwrap().write(0, 0, Some(&1u64.to_be_bytes()));
        writer.column_writer("b").unwrap().write(0, 1, None);
        writer.add_row().unwrap();
        writer.commit().unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.row_count(), 1);
    }
}
