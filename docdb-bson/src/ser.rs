//! Marshalling native values into the value tree.
//!
//! This is the structural walk of the original reflection-based encoder,
//! re-expressed as a serde `Serializer` whose output is a [`Value`]:
//! structs become documents with lower-cased field names (`id_` remapping
//! to the server's `_id` primary key), string-keyed maps become documents,
//! sequences become arrays, and scalars map onto the narrowest element
//! kind that holds them.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;
use crate::{datetime, oid, MAX_DEPTH, SCALAR_FIELD};
use serde::ser::{self, Serialize};

/// Newtype tokens [`Value`]'s own `Serialize` impl uses so kinds without a
/// native serde representation survive a pass through this serializer.
pub(crate) const BINARY_TOKEN: &str = "$docdb_bson::Binary";
pub(crate) const REGEX_TOKEN: &str = "$docdb_bson::Regex";
pub(crate) const TIMESTAMP_TOKEN: &str = "$docdb_bson::Timestamp";

/// Reflects `value` into a tree. The result is always document- or
/// array-kind: a bare scalar is wrapped as `{"val": scalar}`.
pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let v = value.serialize(ValueSerializer { depth: 0 })?;
    Ok(match v {
        Value::Document(_) | Value::Array(_) => v,
        scalar => {
            let mut doc = Document::new();
            doc.insert(SCALAR_FIELD, scalar);
            Value::Document(doc)
        }
    })
}

/// Like [`marshal`], but requires the result to be a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document> {
    match marshal(value)? {
        Value::Document(doc) => Ok(doc),
        other => Err(Error::mismatch("document", other.kind())),
    }
}

/// Marshals and encodes in one step.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    crate::encode::encode_document(&to_document(value)?)
}

/// Lower-cases a struct field name and applies the `id_` -> `_id` remap.
fn field_key(name: &str) -> String {
    let key = name.to_ascii_lowercase();
    if key == "id_" {
        "_id".to_owned()
    } else {
        key
    }
}

#[derive(Clone, Copy)]
struct ValueSerializer {
    depth: usize,
}

impl ValueSerializer {
    /// Containers opened at the depth limit fail instead of recursing
    /// forever through cyclic reference graphs.
    fn nest(&self) -> Result<ValueSerializer> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        Ok(ValueSerializer {
            depth: self.depth + 1,
        })
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SeqSerializer;
    type SerializeTuple = SeqSerializer;
    type SerializeTupleStruct = SeqSerializer;
    type SerializeTupleVariant = VariantSeqSerializer;
    type SerializeMap = MapSerializer;
    type SerializeStruct = StructSerializer;
    type SerializeStructVariant = VariantStructSerializer;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::Int32(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::Int32(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::Int32(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Int64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::Int32(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::Int32(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::Int64(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        i64::try_from(v)
            .map(Value::Int64)
            .map_err(|_| Error::NumericOverflow)
    }

    fn serialize_i128(self, _v: i128) -> Result<Value> {
        Err(Error::UnsupportedKind("i128"))
    }

    fn serialize_u128(self, _v: u128) -> Result<Value> {
        Err(Error::UnsupportedKind("u128"))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::Double(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Double(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::binary(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value> {
        match name {
            datetime::NEWTYPE_TOKEN => match value.serialize(self)? {
                Value::Int64(ms) => Ok(Value::DateTime(crate::DateTime::from_millis(ms))),
                other => Err(Error::mismatch("datetime milliseconds", other.kind())),
            },
            oid::NEWTYPE_TOKEN => match value.serialize(self)? {
                Value::Binary { data, .. } => {
                    let bytes: [u8; 12] = data
                        .try_into()
                        .map_err(|_| Error::InvalidObjectId("wrong byte length".into()))?;
                    Ok(Value::ObjectId(crate::ObjectId::from_bytes(bytes)))
                }
                other => Err(Error::mismatch("object id bytes", other.kind())),
            },
            TIMESTAMP_TOKEN => match value.serialize(self)? {
                // Carried bit-cast through Int64 so the full u64 range fits.
                Value::Int64(bits) => Ok(Value::Timestamp(bits as u64)),
                other => Err(Error::mismatch("timestamp", other.kind())),
            },
            BINARY_TOKEN => match value.serialize(self)? {
                Value::Document(mut parts) => {
                    let subtype = parts.get("subtype").int32() as u8;
                    match parts.remove("data") {
                        Some(Value::Binary { data, .. }) => Ok(Value::Binary { subtype, data }),
                        _ => Err(Error::Malformed("binary token payload")),
                    }
                }
                other => Err(Error::mismatch("binary payload", other.kind())),
            },
            REGEX_TOKEN => match value.serialize(self)? {
                Value::Document(parts) => Ok(Value::Regex {
                    pattern: parts.get("pattern").as_str().to_owned(),
                    options: parts.get("options").as_str().to_owned(),
                }),
                other => Err(Error::mismatch("regex payload", other.kind())),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        let mut doc = Document::new();
        doc.insert(variant, value.serialize(self.nest()?)?);
        Ok(Value::Document(doc))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqSerializer> {
        Ok(SeqSerializer {
            values: Vec::with_capacity(len.unwrap_or(0)),
            element: self.nest()?,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqSerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqSerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqSerializer> {
        Ok(VariantSeqSerializer {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapSerializer> {
        Ok(MapSerializer {
            doc: Document::new(),
            key: None,
            element: self.nest()?,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<StructSerializer> {
        Ok(StructSerializer {
            doc: Document::new(),
            element: self.nest()?,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantStructSerializer> {
        Ok(VariantStructSerializer {
            variant,
            inner: self.serialize_struct("", len)?,
        })
    }
}

struct SeqSerializer {
    values: Vec<Value>,
    element: ValueSerializer,
}

impl ser::SerializeSeq for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.values.push(value.serialize(self.element)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.values))
    }
}

impl ser::SerializeTuple for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqSerializer {
    variant: &'static str,
    inner: SeqSerializer,
}

impl ser::SerializeTupleVariant for VariantSeqSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Value> {
        let mut doc = Document::new();
        doc.insert(self.variant, ser::SerializeSeq::end(self.inner)?);
        Ok(Value::Document(doc))
    }
}

struct MapSerializer {
    doc: Document,
    key: Option<String>,
    element: ValueSerializer,
}

impl ser::SerializeMap for MapSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| ser::Error::custom("serialize_value called before serialize_key"))?;
        self.doc.insert(key, value.serialize(self.element)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Document(self.doc))
    }
}

struct StructSerializer {
    doc: Document,
    element: ValueSerializer,
}

impl ser::SerializeStruct for StructSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.doc.insert(field_key(key), value.serialize(self.element)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Document(self.doc))
    }
}

struct VariantStructSerializer {
    variant: &'static str,
    inner: StructSerializer,
}

impl ser::SerializeStructVariant for VariantStructSerializer {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value> {
        let mut doc = Document::new();
        doc.insert(self.variant, ser::SerializeStruct::end(self.inner)?);
        Ok(Value::Document(doc))
    }
}

/// Map keys must be strings; anything else is the key-kind error.
struct MapKeySerializer;

macro_rules! key_must_be_string {
    ($($method:ident: $ty:ty => $kind:literal,)*) => {
        $(
            fn $method(self, _v: $ty) -> Result<String> {
                Err(Error::InvalidKeyKind($kind))
            }
        )*
    };
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = ser::Impossible<String, Error>;
    type SerializeTuple = ser::Impossible<String, Error>;
    type SerializeTupleStruct = ser::Impossible<String, Error>;
    type SerializeTupleVariant = ser::Impossible<String, Error>;
    type SerializeMap = ser::Impossible<String, Error>;
    type SerializeStruct = ser::Impossible<String, Error>;
    type SerializeStructVariant = ser::Impossible<String, Error>;

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_owned())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    key_must_be_string! {
        serialize_bool: bool => "boolean",
        serialize_i8: i8 => "integer",
        serialize_i16: i16 => "integer",
        serialize_i32: i32 => "integer",
        serialize_i64: i64 => "integer",
        serialize_u8: u8 => "integer",
        serialize_u16: u16 => "integer",
        serialize_u32: u32 => "integer",
        serialize_u64: u64 => "integer",
        serialize_f32: f32 => "float",
        serialize_f64: f64 => "float",
        serialize_bytes: &[u8] => "bytes",
    }

    fn serialize_none(self) -> Result<String> {
        Err(Error::InvalidKeyKind("null"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(Error::InvalidKeyKind("null"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(Error::InvalidKeyKind("unit"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(Error::InvalidKeyKind("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::InvalidKeyKind("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::InvalidKeyKind("sequence"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(Error::InvalidKeyKind("sequence"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::InvalidKeyKind("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::InvalidKeyKind("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(Error::InvalidKeyKind("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::InvalidKeyKind("enum"))
    }
}

impl Serialize for Document {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Document(v) => v.serialize(serializer),
            Value::Array(v) => serializer.collect_seq(v),
            Value::Binary { subtype, data } => serializer.serialize_newtype_struct(
                BINARY_TOKEN,
                &BinaryParts {
                    subtype: *subtype,
                    data: serde_bytes::Bytes::new(data),
                },
            ),
            Value::ObjectId(v) => v.serialize(serializer),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::DateTime(v) => v.serialize(serializer),
            Value::Null => serializer.serialize_unit(),
            Value::Regex { pattern, options } => serializer.serialize_newtype_struct(
                REGEX_TOKEN,
                &RegexParts { pattern, options },
            ),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Timestamp(v) => {
                serializer.serialize_newtype_struct(TIMESTAMP_TOKEN, &(*v as i64))
            }
            Value::Int64(v) => serializer.serialize_i64(*v),
        }
    }
}

#[derive(serde::Serialize)]
struct BinaryParts<'a> {
    subtype: u8,
    data: &'a serde_bytes::Bytes,
}

#[derive(serde::Serialize)]
struct RegexParts<'a> {
    pattern: &'a str,
    options: &'a str,
}
