//! Builder-driven parsing of document bytes.

use crate::builder::{Builder, NoopBuilder, TreeBuilder};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;
use crate::MAX_DEPTH;

/// Parses one length-prefixed document, pushing every element into
/// `builder`. The length prefix is used for bounds checking only; the
/// element loop ends at the 0x00 terminator.
pub fn decode_document<B: Builder>(bytes: &[u8], builder: &mut B) -> Result<()> {
    let mut reader = Reader::new(bytes);
    let len = reader.i32_le()?;
    if len < MIN_DOCUMENT_LEN || len as usize > bytes.len() {
        return Err(Error::Malformed("document length prefix out of bounds"));
    }
    decode_elements(&mut reader, builder, 0)
}

/// Checks that `bytes` is a well-formed document without building a tree.
pub fn validate(bytes: &[u8]) -> Result<()> {
    decode_document(bytes, &mut NoopBuilder)
}

/// Parses a document into a [`Document`] tree.
pub(crate) fn decode_to_document(bytes: &[u8]) -> Result<Document> {
    let mut root = Value::Document(Document::new());
    decode_document(bytes, &mut TreeBuilder::new(&mut root))?;
    match root {
        Value::Document(doc) => Ok(doc),
        _ => Err(Error::Malformed("root value is not a document")),
    }
}

/// Shortest possible document: 4-byte length plus the terminator.
const MIN_DOCUMENT_LEN: i32 = 5;

fn decode_elements<B: Builder>(reader: &mut Reader<'_>, builder: &mut B, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    loop {
        let tag = reader.u8()?;
        if tag == 0x00 {
            return Ok(());
        }
        let key = reader.cstring()?;
        let mut child = builder.key(key);
        match tag {
            0x01 => child.float64(reader.f64_le()?),
            0x02 => child.string(read_string(reader)?),
            0x03 => {
                child.object();
                read_nested_length(reader)?;
                decode_elements(reader, &mut child, depth + 1)?;
            }
            0x04 => {
                child.array();
                read_nested_length(reader)?;
                decode_elements(reader, &mut child, depth + 1)?;
            }
            0x05 => {
                let len = reader.i32_le()?;
                if len < 0 {
                    return Err(Error::Malformed("negative binary length"));
                }
                let subtype = reader.u8()?;
                let data = reader.take(len as usize)?;
                child.binary(data, subtype);
            }
            0x07 => {
                let bytes: [u8; 12] = reader
                    .take(12)?
                    .try_into()
                    .map_err(|_| Error::Malformed("truncated object id"))?;
                child.object_id(bytes);
            }
            0x08 => match reader.u8()? {
                0 => child.boolean(false),
                1 => child.boolean(true),
                _ => return Err(Error::Malformed("boolean byte must be 0 or 1")),
            },
            0x09 => child.date_millis(reader.i64_le()?),
            0x0A => child.null(),
            0x0B => {
                let pattern = reader.cstring()?;
                let options = reader.cstring()?;
                child.regex(pattern, options);
            }
            0x10 => child.int32(reader.i32_le()?),
            0x11 => child.timestamp(reader.u64_le()?),
            0x12 => child.int64(reader.i64_le()?),
            other => return Err(Error::UnsupportedTag(other)),
        }
        child.flush();
    }
}

/// String payloads are an i32 byte count (including the NUL), the UTF-8
/// bytes, and the NUL. A zero count is tolerated as an empty string with
/// no terminator, which some legacy encoders emitted.
fn read_string<'a>(reader: &mut Reader<'a>) -> Result<&'a str> {
    let len = reader.i32_le()?;
    if len < 0 {
        return Err(Error::Malformed("negative string length"));
    }
    if len == 0 {
        return Ok("");
    }
    let bytes = reader.take(len as usize - 1)?;
    if reader.u8()? != 0 {
        return Err(Error::Malformed("string missing NUL terminator"));
    }
    std::str::from_utf8(bytes).map_err(|_| Error::Malformed("string is not valid UTF-8"))
}

/// Consumes a nested container's length prefix. Nesting is delimited by
/// terminators, so the value only gets a sanity check.
fn read_nested_length(reader: &mut Reader<'_>) -> Result<()> {
    let len = reader.i32_le()?;
    if len < MIN_DOCUMENT_LEN || (len as usize - 4) > reader.remaining() {
        return Err(Error::Malformed("nested document length out of bounds"));
    }
    Ok(())
}

/// Bounds-checked little-endian cursor over the input.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Malformed("unexpected end of document"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.u64_le()?))
    }

    /// NUL-terminated UTF-8.
    fn cstring(&mut self) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::Malformed("cstring missing NUL terminator"))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| Error::Malformed("cstring is not valid UTF-8"))?;
        self.pos += nul + 1;
        Ok(s)
    }
}
