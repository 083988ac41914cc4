//! Append-only columnar file format with Dremel-style repetition/definition
//! level encoding.
//!
//! A [`writer::FileWriter`] is opened against a [`schema::ColumnSpec`] list;
//! per-column writers accept `(rlvl, dlvl, value)` triples and `add_row()` is
//! the single synchronisation point across columns. A sealed file is read
//! back symmetrically with [`reader::FileReader`].

pub mod error;
pub mod framing;
pub mod reader;
pub mod schema;
pub mod writer;

pub use error::ColumnarError;
pub use reader::{ColumnReader, FileReader, Triple};
pub use schema::{ColumnSpec, LogicalType, StorageType};
pub use writer::{ColumnWriter, FileWriter};

// Re-export logging macros for consistent usage across the crate.
pub use log::{debug, error, info, trace, warn};
