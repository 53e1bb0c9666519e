//! Request payload shapes.
//!
//! Each message type encodes its payload exactly as the server expects;
//! [`encode_message`] prepends the 16-byte header. `fullName` fields are
//! dotted `database.collection` identifiers written as NUL-terminated
//! cstrings.

use crate::error::ProtocolError;
use crate::header::{MsgHeader, OpCode, HEADER_SIZE};
use crate::MAX_MESSAGE_SIZE;
use bytes::{BufMut, BytesMut};
use docdb_bson::Document;

/// A request payload the framer can put on the wire.
pub trait Message {
    fn op_code(&self) -> OpCode;
    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;
}

/// Serializes a complete message: header, then payload, with
/// `messageLength` covering both.
pub fn encode_message<M: Message + ?Sized>(
    message: &M,
    request_id: i32,
) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_bytes(0, HEADER_SIZE);
    message.encode_payload(&mut buf)?;
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: buf.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let header = MsgHeader {
        message_length: buf.len() as i32,
        request_id,
        response_to: 0,
        op_code: message.op_code() as i32,
    };
    header.write_into(&mut buf[..HEADER_SIZE]);
    Ok(buf)
}

fn put_cstring(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    if s.as_bytes().contains(&0) {
        return Err(ProtocolError::InvalidCollectionName);
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn put_document(buf: &mut BytesMut, doc: &Document) -> Result<(), ProtocolError> {
    buf.put_slice(&doc.to_bytes()?);
    Ok(())
}

/// Update flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags(i32);

impl UpdateFlags {
    /// Insert the document if no match exists.
    pub const UPSERT: i32 = 1 << 0;
    /// Apply to every matching document, not just the first.
    pub const MULTI_UPDATE: i32 = 1 << 1;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_upsert(mut self) -> Self {
        self.0 |= Self::UPSERT;
        self
    }

    pub fn with_multi_update(mut self) -> Self {
        self.0 |= Self::MULTI_UPDATE;
        self
    }

    pub fn is_upsert(&self) -> bool {
        self.0 & Self::UPSERT != 0
    }

    pub fn is_multi_update(&self) -> bool {
        self.0 & Self::MULTI_UPDATE != 0
    }

    pub fn bits(&self) -> i32 {
        self.0
    }
}

/// Delete flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteFlags(i32);

impl DeleteFlags {
    /// Remove only the first matching document.
    pub const SINGLE_REMOVE: i32 = 1 << 0;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_single_remove(mut self) -> Self {
        self.0 |= Self::SINGLE_REMOVE;
        self
    }

    pub fn is_single_remove(&self) -> bool {
        self.0 & Self::SINGLE_REMOVE != 0
    }

    pub fn bits(&self) -> i32 {
        self.0
    }
}

/// Query flag bits. Bit 0 is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags(i32);

impl QueryFlags {
    /// Leave the cursor open after the initial batch is drained.
    pub const TAILABLE_CURSOR: i32 = 1 << 1;
    /// Allow reads from non-primary servers.
    pub const SLAVE_OK: i32 = 1 << 2;
    /// Prevent server-side idle-cursor reaping.
    pub const NO_CURSOR_TIMEOUT: i32 = 1 << 4;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_tailable_cursor(mut self) -> Self {
        self.0 |= Self::TAILABLE_CURSOR;
        self
    }

    pub fn with_slave_ok(mut self) -> Self {
        self.0 |= Self::SLAVE_OK;
        self
    }

    pub fn with_no_cursor_timeout(mut self) -> Self {
        self.0 |= Self::NO_CURSOR_TIMEOUT;
        self
    }

    pub fn is_tailable_cursor(&self) -> bool {
        self.0 & Self::TAILABLE_CURSOR != 0
    }

    pub fn is_slave_ok(&self) -> bool {
        self.0 & Self::SLAVE_OK != 0
    }

    pub fn is_no_cursor_timeout(&self) -> bool {
        self.0 & Self::NO_CURSOR_TIMEOUT != 0
    }

    pub fn bits(&self) -> i32 {
        self.0
    }
}

/// `i32 0 || cstring fullName || document`
#[derive(Debug)]
pub struct Insert<'a> {
    pub full_name: &'a str,
    pub document: &'a Document,
}

impl Message for Insert<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::Insert
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(0);
        put_cstring(buf, self.full_name)?;
        put_document(buf, self.document)
    }
}

/// `i32 0 || cstring fullName || i32 flags || selector || update`
#[derive(Debug)]
pub struct Update<'a> {
    pub full_name: &'a str,
    pub flags: UpdateFlags,
    pub selector: &'a Document,
    pub update: &'a Document,
}

impl Message for Update<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::Update
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(0);
        put_cstring(buf, self.full_name)?;
        buf.put_i32_le(self.flags.bits());
        put_document(buf, self.selector)?;
        put_document(buf, self.update)
    }
}

/// `i32 0 || cstring fullName || i32 flags || selector`
#[derive(Debug)]
pub struct Delete<'a> {
    pub full_name: &'a str,
    pub flags: DeleteFlags,
    pub selector: &'a Document,
}

impl Message for Delete<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::Delete
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(0);
        put_cstring(buf, self.full_name)?;
        buf.put_i32_le(self.flags.bits());
        put_document(buf, self.selector)
    }
}

/// `i32 flags || cstring fullName || i32 skip || i32 limit || query`
#[derive(Debug)]
pub struct Query<'a> {
    pub flags: QueryFlags,
    pub full_name: &'a str,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: &'a Document,
}

impl Message for Query<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::Query
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(self.flags.bits());
        put_cstring(buf, self.full_name)?;
        buf.put_i32_le(self.number_to_skip);
        buf.put_i32_le(self.number_to_return);
        put_document(buf, self.query)
    }
}

/// `i32 0 || cstring fullName || i32 numberToReturn || i64 cursorId`
#[derive(Debug)]
pub struct GetMore<'a> {
    pub full_name: &'a str,
    pub number_to_return: i32,
    pub cursor_id: i64,
}

impl Message for GetMore<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::GetMore
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(0);
        put_cstring(buf, self.full_name)?;
        buf.put_i32_le(self.number_to_return);
        buf.put_i64_le(self.cursor_id);
        Ok(())
    }
}

/// `i32 0 || i32 count || count x i64 cursorId`
#[derive(Debug)]
pub struct KillCursors<'a> {
    pub cursor_ids: &'a [i64],
}

impl Message for KillCursors<'_> {
    fn op_code(&self) -> OpCode {
        OpCode::KillCursors
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(0);
        buf.put_i32_le(self.cursor_ids.len() as i32);
        for id in self.cursor_ids {
            buf.put_i64_le(*id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::read_i32;
    use docdb_bson::doc;

    fn payload_of(bytes: &BytesMut) -> &[u8] {
        &bytes[HEADER_SIZE..]
    }

    #[test]
    fn test_framing_law() {
        // The first four bytes of every message equal its total length.
        let doc = doc! {"a": 1};
        let messages: Vec<BytesMut> = vec![
            encode_message(&Insert { full_name: "db.c", document: &doc }, 1).unwrap(),
            encode_message(
                &Update {
                    full_name: "db.c",
                    flags: UpdateFlags::new(),
                    selector: &doc,
                    update: &doc,
                },
                2,
            )
            .unwrap(),
            encode_message(
                &Delete { full_name: "db.c", flags: DeleteFlags::new(), selector: &doc },
                3,
            )
            .unwrap(),
            encode_message(
                &Query {
                    flags: QueryFlags::new(),
                    full_name: "db.c",
                    number_to_skip: 0,
                    number_to_return: 0,
                    query: &doc,
                },
                4,
            )
            .unwrap(),
            encode_message(
                &GetMore { full_name: "db.c", number_to_return: 0, cursor_id: 99 },
                5,
            )
            .unwrap(),
            encode_message(&KillCursors { cursor_ids: &[1, 2] }, 6).unwrap(),
        ];
        for msg in &messages {
            assert_eq!(read_i32(msg, 0) as usize, msg.len());
        }
    }

    #[test]
    fn test_insert_layout() {
        let doc = doc! {"val": 20i64};
        let msg = encode_message(&Insert { full_name: "db.coll", document: &doc }, 42).unwrap();

        let header = MsgHeader::parse(&msg).unwrap();
        assert_eq!(header.request_id, 42);
        assert_eq!(header.response_to, 0);
        assert_eq!(header.op_code, OpCode::Insert as i32);

        let payload = payload_of(&msg);
        assert_eq!(&payload[0..4], &[0, 0, 0, 0]);
        assert_eq!(&payload[4..12], b"db.coll\0");
        assert_eq!(&payload[12..], doc.to_bytes().unwrap().as_slice());
    }

    #[test]
    fn test_query_layout() {
        let q = doc! {};
        let msg = encode_message(
            &Query {
                flags: QueryFlags::new().with_slave_ok(),
                full_name: "db.coll",
                number_to_skip: 3,
                number_to_return: 7,
                query: &q,
            },
            1,
        )
        .unwrap();

        let payload = payload_of(&msg);
        assert_eq!(read_i32(payload, 0), QueryFlags::SLAVE_OK);
        assert_eq!(&payload[4..12], b"db.coll\0");
        assert_eq!(read_i32(payload, 12), 3);
        assert_eq!(read_i32(payload, 16), 7);
        assert_eq!(&payload[20..], q.to_bytes().unwrap().as_slice());
    }

    #[test]
    fn test_update_flag_bits() {
        assert_eq!(UpdateFlags::new().bits(), 0);
        assert_eq!(UpdateFlags::new().with_upsert().bits(), 1);
        assert_eq!(UpdateFlags::new().with_multi_update().bits(), 2);
        assert_eq!(
            UpdateFlags::new().with_upsert().with_multi_update().bits(),
            3
        );
        assert_eq!(DeleteFlags::new().with_single_remove().bits(), 1);
        assert_eq!(QueryFlags::new().with_tailable_cursor().bits(), 2);
        assert_eq!(QueryFlags::new().with_no_cursor_timeout().bits(), 16);
    }

    #[test]
    fn test_update_layout() {
        let sel = doc! {"k": 1};
        let upd = doc! {"k": 2};
        let msg = encode_message(
            &Update {
                full_name: "db.c",
                flags: UpdateFlags::new().with_upsert(),
                selector: &sel,
                update: &upd,
            },
            1,
        )
        .unwrap();

        let payload = payload_of(&msg);
        assert_eq!(&payload[4..9], b"db.c\0");
        assert_eq!(read_i32(payload, 9), 1);
        let sel_bytes = sel.to_bytes().unwrap();
        assert_eq!(&payload[13..13 + sel_bytes.len()], sel_bytes.as_slice());
        assert_eq!(&payload[13 + sel_bytes.len()..], upd.to_bytes().unwrap().as_slice());
    }

    #[test]
    fn test_get_more_layout() {
        let msg = encode_message(
            &GetMore { full_name: "db.c", number_to_return: 5, cursor_id: -2 },
            1,
        )
        .unwrap();
        let payload = payload_of(&msg);
        assert_eq!(&payload[0..4], &[0, 0, 0, 0]);
        assert_eq!(&payload[4..9], b"db.c\0");
        assert_eq!(read_i32(payload, 9), 5);
        assert_eq!(
            i64::from_le_bytes(payload[13..21].try_into().unwrap()),
            -2
        );
    }

    #[test]
    fn test_kill_cursors_layout() {
        let msg = encode_message(&KillCursors { cursor_ids: &[7, -1] }, 1).unwrap();
        let payload = payload_of(&msg);
        assert_eq!(read_i32(payload, 0), 0);
        assert_eq!(read_i32(payload, 4), 2);
        assert_eq!(i64::from_le_bytes(payload[8..16].try_into().unwrap()), 7);
        assert_eq!(i64::from_le_bytes(payload[16..24].try_into().unwrap()), -1);
        assert_eq!(payload.len(), 24);
    }

    #[test]
    fn test_collection_name_with_nul_is_rejected() {
        let doc = doc! {};
        let result = encode_message(&Insert { full_name: "db\0.c", document: &doc }, 1);
        assert!(matches!(result, Err(ProtocolError::InvalidCollectionName)));
    }
}
