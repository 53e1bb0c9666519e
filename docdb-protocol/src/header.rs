//! The fixed message header.
//!
//! Every message on the wire, request or reply, starts with 16 bytes:
//!
//! ```text
//! +---------------+------------+-------------+---------+
//! | messageLength | requestId  | responseTo  | opCode  |
//! |   i32 LE      |  i32 LE    |   i32 LE    | i32 LE  |
//! +---------------+------------+-------------+---------+
//! ```
//!
//! `messageLength` is inclusive of the header itself. `responseTo` is 0 on
//! requests and carries the originating request id on replies.

use crate::error::ProtocolError;
use bytes::BufMut;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Message opcodes. 2003 is reserved (formerly get-by-oid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    Reply = 1,
    Msg = 1000,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl OpCode {
    pub fn from_i32(code: i32) -> Result<OpCode, ProtocolError> {
        match code {
            1 => Ok(OpCode::Reply),
            1000 => Ok(OpCode::Msg),
            2001 => Ok(OpCode::Update),
            2002 => Ok(OpCode::Insert),
            2004 => Ok(OpCode::Query),
            2005 => Ok(OpCode::GetMore),
            2006 => Ok(OpCode::Delete),
            2007 => Ok(OpCode::KillCursors),
            other => Err(ProtocolError::UnexpectedOpCode(other)),
        }
    }
}

/// A parsed or to-be-written message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message size, including these 16 bytes.
    pub message_length: i32,
    /// Identifier for this message, unique per connection.
    pub request_id: i32,
    /// Request id this message answers; 0 for requests.
    pub response_to: i32,
    /// One of the [`OpCode`] values.
    pub op_code: i32,
}

impl MsgHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code);
    }

    /// Writes the header into an already-reserved 16-byte prefix.
    pub(crate) fn write_into(&self, slot: &mut [u8]) {
        slot[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        slot[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        slot[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        slot[12..16].copy_from_slice(&self.op_code.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<MsgHeader, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated("message header"));
        }
        Ok(MsgHeader {
            message_length: read_i32(bytes, 0),
            request_id: read_i32(bytes, 4),
            response_to: read_i32(bytes, 8),
            op_code: read_i32(bytes, 12),
        })
    }
}

pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(
        bytes[offset..offset + 4]
            .try_into()
            .expect("4-byte slice"),
    )
}

pub(crate) fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(
        bytes[offset..offset + 8]
            .try_into()
            .expect("8-byte slice"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_round_trip() {
        let header = MsgHeader {
            message_length: 0x1234,
            request_id: 7,
            response_to: 0,
            op_code: OpCode::Query as i32,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], &[0x34, 0x12, 0, 0]);
        assert_eq!(MsgHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_parse_rejects_short_input() {
        let result = MsgHeader::parse(&[0u8; 15]);
        assert!(matches!(result, Err(ProtocolError::Truncated(_))));
    }

    #[test]
    fn test_opcode_values() {
        assert_eq!(OpCode::Reply as i32, 1);
        assert_eq!(OpCode::Msg as i32, 1000);
        assert_eq!(OpCode::Update as i32, 2001);
        assert_eq!(OpCode::Insert as i32, 2002);
        assert_eq!(OpCode::Query as i32, 2004);
        assert_eq!(OpCode::GetMore as i32, 2005);
        assert_eq!(OpCode::Delete as i32, 2006);
        assert_eq!(OpCode::KillCursors as i32, 2007);
    }

    #[test]
    fn test_opcode_from_i32() {
        assert_eq!(OpCode::from_i32(2004).unwrap(), OpCode::Query);
        // The reserved opcode is not accepted.
        assert!(matches!(
            OpCode::from_i32(2003),
            Err(ProtocolError::UnexpectedOpCode(2003))
        ));
    }
}
