//! The tagged value tree.

use crate::datetime::DateTime;
use crate::document::Document;
use crate::error::Result;
use crate::oid::ObjectId;
use std::fmt;

/// Element tags as they appear on the wire.
///
/// Deprecated tags (Undefined 0x06, DBPointer 0x0C, Code 0x0D, Symbol 0x0E,
/// CodeWScope 0x0F, MinKey 0xFF, MaxKey 0x7F) are recognized by the decoder
/// but rejected with [`crate::Error::UnsupportedTag`]; they have no variant
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    Regex = 0x0B,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
}

impl Kind {
    /// The tag byte written before the element key.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Document => "document",
            Kind::Array => "array",
            Kind::Binary => "binary",
            Kind::ObjectId => "object id",
            Kind::Boolean => "boolean",
            Kind::DateTime => "datetime",
            Kind::Null => "null",
            Kind::Regex => "regex",
            Kind::Int32 => "int32",
            Kind::Timestamp => "timestamp",
            Kind::Int64 => "int64",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single element value: scalar, embedded document, or array.
///
/// Equality is structural. Document children compare by key set and value,
/// never by insertion order; doubles compare by IEEE equality.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Value>),
    Binary { subtype: u8, data: Vec<u8> },
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime),
    Null,
    Regex { pattern: String, options: String },
    Int32(i32),
    Timestamp(u64),
    Int64(i64),
}

/// The shared missing-value identity returned by [`Value::get`] and
/// [`Value::elem`] on lookup misses.
static NULL: Value = Value::Null;

impl Value {
    /// Shared reference to the Null singleton.
    pub fn null() -> &'static Value {
        &NULL
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Double(_) => Kind::Double,
            Value::String(_) => Kind::String,
            Value::Document(_) => Kind::Document,
            Value::Array(_) => Kind::Array,
            Value::Binary { .. } => Kind::Binary,
            Value::ObjectId(_) => Kind::ObjectId,
            Value::Boolean(_) => Kind::Boolean,
            Value::DateTime(_) => Kind::DateTime,
            Value::Null => Kind::Null,
            Value::Regex { .. } => Kind::Regex,
            Value::Int32(_) => Kind::Int32,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::Int64(_) => Kind::Int64,
        }
    }

    /// Constructs a binary value with the generic (0x00) subtype.
    pub fn binary(data: impl Into<Vec<u8>>) -> Value {
        Value::Binary {
            subtype: 0,
            data: data.into(),
        }
    }

    // Scalar accessors. Each returns the kind's zero value when the tag
    // does not match, mirroring lookup-miss behavior.

    pub fn number(&self) -> f64 {
        match self {
            Value::Double(v) => *v,
            _ => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::String(v) => v,
            _ => "",
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    pub fn int32(&self) -> i32 {
        match self {
            Value::Int32(v) => *v,
            _ => 0,
        }
    }

    pub fn int64(&self) -> i64 {
        match self {
            Value::Int64(v) => *v,
            _ => 0,
        }
    }

    /// Milliseconds since the epoch; 0 unless this is a datetime.
    pub fn date_millis(&self) -> i64 {
        match self {
            Value::DateTime(v) => v.timestamp_millis(),
            _ => 0,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Value::Timestamp(v) => *v,
            _ => 0,
        }
    }

    /// The zeroed id unless this is an object id.
    pub fn object_id(&self) -> ObjectId {
        match self {
            Value::ObjectId(v) => *v,
            _ => ObjectId::ZERO,
        }
    }

    pub fn regex(&self) -> (&str, &str) {
        match self {
            Value::Regex { pattern, options } => (pattern, options),
            _ => ("", ""),
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Looks up a field of a document value. Returns the Null singleton on
    /// a miss or when this value is not a document.
    pub fn get(&self, key: &str) -> &Value {
        match self {
            Value::Document(d) => d.get(key),
            _ => Value::null(),
        }
    }

    /// Looks up an array element. Returns the Null singleton when out of
    /// range or when this value is not an array.
    pub fn elem(&self, index: usize) -> &Value {
        match self {
            Value::Array(a) => a.get(index).unwrap_or_else(|| Value::null()),
            _ => Value::null(),
        }
    }

    /// Child count for documents and arrays, 0 for everything else.
    pub fn len(&self) -> usize {
        match self {
            Value::Document(d) => d.len(),
            Value::Array(a) => a.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical payload serialization of this value, without the tag byte
    /// and key framing an element would carry inside a document.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        crate::encode::value_bytes(self)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Double(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Value {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Array(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Value {
        Value::ObjectId(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Value {
        Value::DateTime(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Value {
        Value::DateTime(DateTime::from_chrono(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
