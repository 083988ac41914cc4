//! Low-level length-prefixed binary framing, in the same manual
//! read_u32/read_u64-style as the teacher's segment file I/O.

use crate::error::ColumnarError;
use std::io::{Read, Write};

pub const MAGIC: u32 = 0x4551_4353; // "EQCS"
pub const FORMAT_VERSION: u32 = 1;

pub fn write_u8<W: Write>(w: &mut W, v: u8, ctx: &str) -> Result<(), ColumnarError> {
    w.write_all(&[v]).map_err(|e| ColumnarError::from_io_error(e, ctx))
}

pub fn write_u32<W: Write>(w: &mut W, v: u32, ctx: &str) -> Result<(), ColumnarError> {
    w.write_all(&v.to_be_bytes())
        .map_err(|e| ColumnarError::from_io_error(e, ctx))
}

pub fn write_u64<W: Write>(w: &mut W, v: u64, ctx: &str) -> Result<(), ColumnarError> {
    w.write_all(&v.to_be_bytes())
        .map_err(|e| ColumnarError::from_io_error(e, ctx))
}

pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8], ctx: &str) -> Result<(), ColumnarError> {
    write_u32(w, bytes.len() as u32, ctx)?;
    w.write_all(bytes).map_err(|e| ColumnarError::from_io_error(e, ctx))
}

pub fn read_u8<R: Read>(r: &mut R, ctx: &str) -> Result<u8, ColumnarError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|e| ColumnarError::from_io_error(e, ctx))?;
    Ok(buf[0])
}

pub fn read_u32<R: Read>(r: &mut R, ctx: &str) -> Result<u32, ColumnarError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| ColumnarError::from_io_error(e, ctx))?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_u64<R: Read>(r: &mut R, ctx: &str) -> Result<u64, ColumnarError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|e| ColumnarError::from_io_error(e, ctx))?;
    Ok(u64::from_be_bytes(buf))
}

pub fn read_bytes<R: Read>(r: &mut R, ctx: &str) -> Result<Vec<u8>, ColumnarError> {
    let len = read_u32(r, ctx)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| ColumnarError::from_io_error(e, ctx))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"hello", "test").unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_bytes(&mut cursor, "test").unwrap();
        assert_eq!(out, b"hello");
    }
}
