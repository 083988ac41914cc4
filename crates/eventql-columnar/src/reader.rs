//! Per-column readers and the file-level reader.

use crate::error::ColumnarError;
use crate::framing::{read_bytes, read_u32, read_u64, read_u8, FORMAT_VERSION, MAGIC};
use crate::schema::{ColumnSpec, LogicalType, StorageType};
use crate::writer::ColumnWriter;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub rlvl: u8,
    pub dlvl: u8,
    pub value: Option<Vec<u8>>,
}

pub struct ColumnReader {
    pub spec: ColumnSpec,
    triples: Vec<Triple>,
    position: usize,
}

impl ColumnReader {
    /// Peeks the repetition level of the next unread triple without consuming it.
    pub fn next_repetition_level(&self) -> Option<u8> {
        self.triples.get(self.position).map(|t| t.rlvl)
    }

    /// Reads the next triple, advancing the cursor.
    pub fn next_triple(&mut self) -> Option<Triple> {
        let triple = self.triples.get(self.position).cloned();
        if triple.is_some() {
            self.position += 1;
        }
        triple
    }

    /// Copies the next triple directly into another column's writer without
    /// the caller having to unpack and repack the value — used by compaction
    /// to move records between segments column-by-column.
    pub fn copy_value(&mut self, writer: &mut ColumnWriter) -> Result<(), ColumnarError> {
        let triple = self.triples.get(self.position).ok_or_else(|| ColumnarError::IllegalState {
            context: "copy_value() called past end of column".to_string(),
        })?;
        writer.write(triple.rlvl, triple.dlvl, triple.value.as_deref());
        self.position += 1;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.triples.len() - self.position
    }
}

pub struct FileReader {
    order: Vec<String>,
    columns: HashMap<String, ColumnReader>,
    row_count: u64,
}

impl FileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ColumnarError> {
        let file = File::open(path.as_ref()).map_err(|e| ColumnarError::from_io_error(e, "opening columnar file"))?;
        let mut input = BufReader::new(file);

        let magic = read_u32(&mut input, "magic")?;
        if magic != MAGIC {
            return Err(ColumnarError::Corruption {
                context: "file header".to_string(),
                reason: format!("bad magic {magic:#x}"),
            });
        }
        let version = read_u32(&mut input, "format version")?;
        if version != FORMAT_VERSION {
            return Err(ColumnarError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let column_count = read_u32(&mut input, "column count")? as usize;
        let row_count = read_u64(&mut input, "row count")?;

        let mut order = Vec::with_capacity(column_count);
        let mut specs = Vec::with_capacity(column_count);
        let mut triple_counts = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let name_bytes = read_bytes(&mut input, "column name")?;
            let name = String::from_utf8(name_bytes).map_err(|e| ColumnarError::Corruption {
                context: "column name".to_string(),
                reason: e.to_string(),
            })?;
            let logical_tag = read_u8(&mut input, "logical type")?;
            let storage_tag = read_u8(&mut input, "storage type")?;
            let optional = read_u8(&mut input, "optional flag")? != 0;
            let repeated = read_u8(&mut input, "repeated flag")? != 0;
            let max_dlvl = read_u8(&mut input, "max dlvl")?;
            let max_rlvl = read_u8(&mut input, "max rlvl")?;
            let triple_count = read_u64(&mut input, "triple count")?;

            let logical_type = LogicalType::from_tag(logical_tag).ok_or_else(|| ColumnarError::Corruption {
                context: name.clone(),
                reason: format!("unknown logical type tag {logical_tag}"),
            })?;
            let storage_type = StorageType::from_tag(storage_tag).ok_or_else(|| ColumnarError::Corruption {
                context: name.clone(),
                reason: format!("unknown storage type tag {storage_tag}"),
            })?;

            order.push(name.clone());
            specs.push(ColumnSpec {
                name,
                logical_type,
                storage_type,
                optional,
                repeated,
                max_definition_level: max_dlvl,
                max_repetition_level: max_rlvl,
            });
            triple_counts.push(triple_count);
        }

        let mut columns = HashMap::with_capacity(column_count);
        for (spec, triple_count) in specs.into_iter().zip(triple_counts) {
            let triples = read_triples(&mut input, triple_count)?;
            let name = spec.name.clone();
            columns.insert(
                name,
                ColumnReader {
                    spec,
                    triples,
                    position: 0,
                },
            );
        }

        Ok(Self {
            order,
            columns,
            row_count,
        })
    }

    pub fn column_reader(&mut self, name: &str) -> Result<&mut ColumnReader, ColumnarError> {
        self.columns
            .get_mut(name)
            .ok_or_else(|| ColumnarError::ColumnNotFound { name: name.to_string() })
    }

    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }
}

fn read_triples<R: Read>(input: &mut R, count: u64) -> Result<Vec<Triple>, ColumnarError> {
    let mut triples = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let rlvl = read_u8(input, "rlvl")?;
        let dlvl = read_u8(input, "dlvl")?;
        let has_value = read_u8(input, "has_value")? != 0;
        let value = if has_value {
            Some(read_bytes(input, "value")?)
        } else {
            None
        };
        triples.push(Triple { rlvl, dlvl, value });
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use crate::writer::FileWriter;
    use tempfile::tempdir;

    fn schema() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::required("a", LogicalType::Uint64, StorageType::Uint64),
            ColumnSpec::repeated("b", LogicalType::String, StorageType::Bytes),
        ]
    }

    #[test]
    fn round_trips_100_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.cst");
        let mut writer = FileWriter::create(&path, schema()).unwrap();
        for i in 0..100u64 {
            writer.column_writer("a").unwrap().write(0, 0, Some(&i.to_be_bytes()));
            writer.column_writer("b").unwrap().write(0, 1, None);
            writer.column_writer("b").unwrap().write(1, 1, Some(b"x"));
            writer.add_row().unwrap();
        }
        writer.commit().unwrap();

        let mut reader = FileReader::open(&path).unwrap();
        assert_eq!(reader.row_count(), 100);
        let a = reader.column_reader("a").unwrap();
        assert_eq!(a.remaining(), 100);
        let mut seen = 0u64;
        while let Some(t) = a.next_triple() {
            assert_eq!(t.value, Some(seen.to_be_bytes().to_vec()));
            seen += 1;
        }
        assert_eq!(seen, 100);

        let b = reader.column_reader("b").unwrap();
        assert_eq!(b.remaining(), 200);
    }

    #[test]
    fn refuses_unknown_format_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.cst");
        std::fs::write(&path, [0x45, 0x51, 0x43, 0x53, 0, 0, 0, 99]).unwrap();
        let err = FileReader::open(&path).unwrap_err();
        assert!(matches!(err, ColumnarError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn copy_value_transfers_between_columns() {
        let dir = tempdir().unwrap();
        let src_path = dir.path().join("src.cst");
        let mut writer = FileWriter::create(&src_path, vec![ColumnSpec::required(
            "a",
            LogicalType::Uint64,
            StorageType::Uint64,
        )])
        .unwrap();
        writer.column_writer("a").unwrap().write(0, 0, Some(&7u64.to_be_bytes()));
        writer.add_row().unwrap();
        writer.commit().unwrap();

        let mut reader = FileReader::open(&src_path).unwrap();
        let dst_path = dir.path().join("dst.cst");
        let mut dst = FileWriter::create(&dst_path, vec![ColumnSpec::required(
            "a",
            LogicalType::Uint64,
            StorageType::Uint64,
        )])
        .unwrap();
        {
            let src_col = reader.column_reader("a").unwrap();
            src_col.copy_value(dst.column_writer("a").unwrap()).unwrap();
        }
        dst.add_row().unwrap();
        dst.commit().unwrap();

        let mut dst_reader = FileReader::open(&dst_path).unwrap();
        let t = dst_reader.column_reader("a").unwrap().next_triple().unwrap();
        assert_eq!(t.value, Some(7u64.to_be_bytes().to_vec()));
    }
}
