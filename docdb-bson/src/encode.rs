//! Canonical byte encoding of value trees.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;
use crate::MAX_DEPTH;
use bytes::{BufMut, BytesMut};

/// Serializes a document to its canonical form: a little-endian i32 total
/// length (inclusive), one `tag || key || NUL || payload` element per
/// field, and a 0x00 terminator.
pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(64);
    write_document(&mut buf, doc, 0)?;
    Ok(buf.to_vec())
}

/// Canonical payload bytes of a single value, without tag and key framing.
pub(crate) fn value_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(16);
    write_value(&mut buf, value, 0)?;
    Ok(buf.to_vec())
}

fn write_document(buf: &mut BytesMut, doc: &Document, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let start = buf.len();
    buf.put_i32_le(0);
    for (key, value) in doc.iter() {
        write_element(buf, key, value, depth)?;
    }
    buf.put_u8(0);
    patch_length(buf, start)
}

fn write_array(buf: &mut BytesMut, values: &[Value], depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let start = buf.len();
    buf.put_i32_le(0);
    // Array elements are keyed by their canonical decimal index.
    for (index, value) in values.iter().enumerate() {
        write_element(buf, &index.to_string(), value, depth)?;
    }
    buf.put_u8(0);
    patch_length(buf, start)
}

fn write_element(buf: &mut BytesMut, key: &str, value: &Value, depth: usize) -> Result<()> {
    buf.put_u8(value.kind().tag());
    write_cstring(buf, key)?;
    write_value(buf, value, depth)
}

fn write_value(buf: &mut BytesMut, value: &Value, depth: usize) -> Result<()> {
    match value {
        Value::Double(v) => buf.put_f64_le(*v),
        Value::String(v) => write_string(buf, v)?,
        Value::Document(v) => write_document(buf, v, depth + 1)?,
        Value::Array(v) => write_array(buf, v, depth + 1)?,
        Value::Binary { subtype, data } => {
            let len = i32::try_from(data.len())
                .map_err(|_| Error::Malformed("binary payload too large"))?;
            buf.put_i32_le(len);
            buf.put_u8(*subtype);
            buf.put_slice(data);
        }
        Value::ObjectId(v) => buf.put_slice(v.as_slice()),
        Value::Boolean(v) => buf.put_u8(*v as u8),
        Value::DateTime(v) => buf.put_i64_le(v.timestamp_millis()),
        Value::Null => {}
        Value::Regex { pattern, options } => {
            write_cstring(buf, pattern)?;
            write_cstring(buf, options)?;
        }
        Value::Int32(v) => buf.put_i32_le(*v),
        Value::Timestamp(v) => buf.put_u64_le(*v),
        Value::Int64(v) => buf.put_i64_le(*v),
    }
    Ok(())
}

/// Strings carry an i32 byte length that includes the trailing NUL.
fn write_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    let len = i32::try_from(s.len() + 1).map_err(|_| Error::Malformed("string too large"))?;
    buf.put_i32_le(len);
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn write_cstring(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::Malformed("cstring contains a NUL byte"));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn patch_length(buf: &mut BytesMut, start: usize) -> Result<()> {
    let len =
        i32::try_from(buf.len() - start).map_err(|_| Error::Malformed("document too large"))?;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}
