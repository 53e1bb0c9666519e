//! Reply envelope parsing.

use crate::error::ProtocolError;
use crate::header::{read_i32, read_i64, MsgHeader, OpCode, HEADER_SIZE};
use bytes::BufMut;
use docdb_bson::Document;

/// Offset of the reply-specific fields, right after the header, within
/// the post-length body this parser receives.
const ENVELOPE_SIZE: usize = 32;

/// A parsed reply: the envelope fields plus the decoded document batch.
#[derive(Debug)]
pub struct Reply {
    /// Request id this reply answers.
    pub response_to: i32,
    /// Server status bits; see [`Reply::cursor_not_found`] and
    /// [`Reply::query_failure`].
    pub response_flags: i32,
    /// Server-side cursor id; 0 when the result set is exhausted.
    pub cursor_id: i64,
    /// Position of the first returned document in the result set.
    pub starting_from: i32,
    /// The returned batch.
    pub documents: Vec<Document>,
}

impl Reply {
    /// The get-more target cursor no longer exists on the server.
    pub const CURSOR_NOT_FOUND: i32 = 1 << 0;
    /// The query failed; the single returned document carries the error.
    pub const QUERY_FAILURE: i32 = 1 << 1;

    /// Parses a reply from everything after the leading 4-byte length
    /// word: the remaining 12 header bytes, the envelope, and
    /// `numberReturned` length-prefixed documents.
    pub fn parse(body: &[u8]) -> Result<Reply, ProtocolError> {
        if body.len() < ENVELOPE_SIZE {
            return Err(ProtocolError::Truncated("reply envelope"));
        }

        // The body starts where byte 4 of the full message would be:
        // requestId, responseTo, opCode, then the reply fields.
        let response_to = read_i32(body, 4);
        let op_code = read_i32(body, 8);
        if op_code != OpCode::Reply as i32 {
            return Err(ProtocolError::UnexpectedOpCode(op_code));
        }
        let response_flags = read_i32(body, 12);
        let cursor_id = read_i64(body, 16);
        let starting_from = read_i32(body, 24);
        let number_returned = read_i32(body, 28);
        if number_returned < 0 {
            return Err(ProtocolError::NegativeDocumentCount);
        }

        let mut documents = Vec::with_capacity(number_returned as usize);
        let mut cursor = ENVELOPE_SIZE;
        for _ in 0..number_returned {
            if body.len() < cursor + 4 {
                return Err(ProtocolError::Truncated("reply document batch"));
            }
            let doc_len = read_i32(body, cursor);
            if doc_len < 5 || body.len() < cursor + doc_len as usize {
                return Err(ProtocolError::Truncated("reply document"));
            }
            let doc = Document::from_bytes(&body[cursor..cursor + doc_len as usize])?;
            documents.push(doc);
            cursor += doc_len as usize;
        }

        Ok(Reply {
            response_to,
            response_flags,
            cursor_id,
            starting_from,
            documents,
        })
    }

    pub fn cursor_not_found(&self) -> bool {
        self.response_flags & Self::CURSOR_NOT_FOUND != 0
    }

    pub fn query_failure(&self) -> bool {
        self.response_flags & Self::QUERY_FAILURE != 0
    }
}

/// Serializes a reply message, header included. The client never sends
/// these; mock servers in tests do.
pub fn encode_reply(
    request_id: i32,
    response_to: i32,
    response_flags: i32,
    cursor_id: i64,
    starting_from: i32,
    documents: &[Document],
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = bytes::BytesMut::with_capacity(64);
    buf.put_bytes(0, HEADER_SIZE);
    buf.put_i32_le(response_flags);
    buf.put_i64_le(cursor_id);
    buf.put_i32_le(starting_from);
    buf.put_i32_le(documents.len() as i32);
    for doc in documents {
        buf.put_slice(&doc.to_bytes()?);
    }
    let header = MsgHeader {
        message_length: buf.len() as i32,
        request_id,
        response_to,
        op_code: OpCode::Reply as i32,
    };
    header.write_into(&mut buf[..HEADER_SIZE]);
    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdb_bson::doc;

    fn sample_reply_bytes(docs: &[Document]) -> Vec<u8> {
        encode_reply(5, 77, 0, 42, 3, docs).unwrap()
    }

    #[test]
    fn test_parse_reply_with_documents() {
        let docs = vec![doc! {"first": 1}, doc! {"second": "two"}];
        let bytes = sample_reply_bytes(&docs);

        // The read path consumes the 4-byte length and hands over the rest.
        let reply = Reply::parse(&bytes[4..]).unwrap();
        assert_eq!(reply.response_to, 77);
        assert_eq!(reply.cursor_id, 42);
        assert_eq!(reply.starting_from, 3);
        assert_eq!(reply.documents, docs);
    }

    #[test]
    fn test_parse_empty_reply() {
        let bytes = sample_reply_bytes(&[]);
        let reply = Reply::parse(&bytes[4..]).unwrap();
        assert!(reply.documents.is_empty());
        assert!(!reply.cursor_not_found());
        assert!(!reply.query_failure());
    }

    #[test]
    fn test_length_word_matches() {
        let bytes = sample_reply_bytes(&[doc! {"a": 1}]);
        assert_eq!(read_i32(&bytes, 0) as usize, bytes.len());
    }

    #[test]
    fn test_parse_rejects_wrong_opcode() {
        let mut bytes = sample_reply_bytes(&[]);
        bytes[12..16].copy_from_slice(&(OpCode::Insert as i32).to_le_bytes());
        let result = Reply::parse(&bytes[4..]);
        assert!(matches!(result, Err(ProtocolError::UnexpectedOpCode(2002))));
    }

    #[test]
    fn test_parse_rejects_truncated_batch() {
        let bytes = sample_reply_bytes(&[doc! {"a": 1}]);
        let body = &bytes[4..];
        for cut in ENVELOPE_SIZE..body.len() - 1 {
            assert!(Reply::parse(&body[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn test_parse_rejects_short_envelope() {
        let result = Reply::parse(&[0u8; ENVELOPE_SIZE - 1]);
        assert!(matches!(result, Err(ProtocolError::Truncated(_))));
    }

    #[test]
    fn test_response_flag_accessors() {
        let mut bytes = sample_reply_bytes(&[]);
        bytes[16..20].copy_from_slice(&(Reply::CURSOR_NOT_FOUND | Reply::QUERY_FAILURE).to_le_bytes());
        let reply = Reply::parse(&bytes[4..]).unwrap();
        assert!(reply.cursor_not_found());
        assert!(reply.query_failure());
    }
}
