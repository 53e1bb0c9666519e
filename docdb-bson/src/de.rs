//! Unmarshalling the value tree into native values.
//!
//! The decoder's reflective sink: a serde `Deserializer` that walks a
//! decoded tree and fills a caller-provided target. Document keys match
//! struct fields case-insensitively (keys are lower-cased, Rust fields
//! already are), `_id` is delivered to an `id_` field, unknown fields are
//! dropped, and scalars coerce along a fixed lattice: integers widen,
//! floats feed integer slots by truncation, and anything else mismatching
//! its slot fails.

use crate::datetime;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::oid;
use crate::value::{Kind, Value};
use serde::de::value::StringDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use serde::Deserialize;
use std::collections::btree_map;
use std::fmt;
use std::vec;

/// Decodes `bytes` and fills a `T`.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    from_document(Document::from_bytes(bytes)?)
}

/// Fills a `T` from an already-decoded document.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    from_value(Value::Document(doc))
}

/// Fills a `T` from a single value.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    T::deserialize(Deserializer { value })
}

/// Variant tags used by the private enum channel that carries kinds
/// without a native serde representation into [`Value`] targets.
const EXOTIC_VARIANTS: &[&str] = &["ObjectId", "DateTime", "Timestamp", "Regex", "Binary"];

struct Deserializer {
    value: Value,
}

impl Deserializer {
    /// Integer reading along the coercion lattice: int32/int64 widen,
    /// datetimes read as their milliseconds, timestamps as their counter,
    /// and doubles truncate (as the legacy decoder did).
    fn int_lossy(&self) -> Result<i64> {
        match &self.value {
            Value::Int32(v) => Ok((*v).into()),
            Value::Int64(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.timestamp_millis()),
            Value::Timestamp(v) => i64::try_from(*v).map_err(|_| Error::NumericOverflow),
            Value::Double(v) => Ok(*v as i64),
            other => Err(Error::mismatch("an integer", other.kind())),
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::mismatch(expected, self.value.kind())
    }
}

macro_rules! deserialize_int {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            let wide = self.int_lossy()?;
            let narrow = <$ty>::try_from(wide).map_err(|_| Error::NumericOverflow)?;
            visitor.$visit(narrow)
        }
    };
}

impl<'de> de::Deserializer<'de> for Deserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Double(v) => visitor.visit_f64(v),
            Value::String(v) => visitor.visit_string(v),
            Value::Document(v) => visitor.visit_map(DocAccess::raw(v)),
            Value::Array(v) => visitor.visit_seq(ArrayAccess::new(v)),
            Value::Boolean(v) => visitor.visit_bool(v),
            Value::Null => visitor.visit_unit(),
            Value::Int32(v) => visitor.visit_i32(v),
            Value::Int64(v) => visitor.visit_i64(v),
            // Kinds with no direct serde representation travel over a
            // private enum channel that Value's own visitor understands.
            exotic => visitor.visit_enum(ExoticAccess { value: exotic }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Boolean(v) => visitor.visit_bool(v),
            _ => Err(self.mismatch("a boolean")),
        }
    }

    deserialize_int!(deserialize_i8, visit_i8, i8);
    deserialize_int!(deserialize_i16, visit_i16, i16);
    deserialize_int!(deserialize_i32, visit_i32, i32);
    deserialize_int!(deserialize_u8, visit_u8, u8);
    deserialize_int!(deserialize_u16, visit_u16, u16);
    deserialize_int!(deserialize_u32, visit_u32, u32);

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i64(self.int_lossy()?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            // Timestamps are the one natively unsigned kind; pass the
            // full range through without the signed detour.
            Value::Timestamp(v) => visitor.visit_u64(v),
            _ => {
                let wide = self.int_lossy()?;
                let v = u64::try_from(wide).map_err(|_| Error::NumericOverflow)?;
                visitor.visit_u64(v)
            }
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match &self.value {
            Value::Double(v) => visitor.visit_f64(*v),
            Value::Int32(v) => visitor.visit_f64((*v).into()),
            Value::Int64(v) => visitor.visit_f64(*v as f64),
            Value::DateTime(v) => visitor.visit_f64(v.timestamp_millis() as f64),
            _ => Err(self.mismatch("a number")),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match &self.value {
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(self.mismatch("a single character")),
                }
            }
            _ => Err(self.mismatch("a single character")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::String(v) => visitor.visit_string(v),
            // A regex target that is really a string slot gets the
            // pattern; the options are discarded (lossy, as documented).
            Value::Regex { pattern, .. } => visitor.visit_string(pattern),
            _ => Err(self.mismatch("a string")),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Binary { data, .. } => visitor.visit_byte_buf(data),
            Value::ObjectId(id) => visitor.visit_byte_buf(id.bytes().to_vec()),
            _ => Err(self.mismatch("bytes")),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => Err(self.mismatch("null")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match name {
            datetime::NEWTYPE_TOKEN => match self.value {
                Value::DateTime(v) => visitor.visit_i64(v.timestamp_millis()),
                Value::Int64(v) => visitor.visit_i64(v),
                Value::Int32(v) => visitor.visit_i64(v.into()),
                _ => Err(self.mismatch("a datetime")),
            },
            oid::NEWTYPE_TOKEN => match &self.value {
                Value::ObjectId(id) => visitor.visit_bytes(&id.bytes()),
                Value::Binary { data, .. } if data.len() == 12 => visitor.visit_bytes(data),
                _ => Err(self.mismatch("an object id")),
            },
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Array(v) => visitor.visit_seq(ArrayAccess::new(v)),
            // Byte-carrying kinds read as sequences of u8.
            Value::Binary { data, .. } => visitor.visit_seq(ArrayAccess::bytes(&data)),
            Value::ObjectId(id) => visitor.visit_seq(ArrayAccess::bytes(&id.bytes())),
            _ => Err(self.mismatch("an array")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        // Fixed-size targets are length-checked up front.
        let actual = match &self.value {
            Value::Array(v) => Some(v.len()),
            Value::Binary { data, .. } => Some(data.len()),
            Value::ObjectId(_) => Some(12),
            _ => None,
        };
        match actual {
            Some(actual) if actual != len => Err(de::Error::invalid_length(
                actual,
                &ExpectedLen(len),
            )),
            _ => self.deserialize_seq(visitor),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::Document(doc) => visitor.visit_map(DocAccess::raw(doc)),
            _ => Err(self.mismatch("a map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value {
            Value::Document(doc) => visitor.visit_map(DocAccess::fields(doc, fields)),
            _ => Err(self.mismatch("a struct")),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value {
            Value::String(s) => visitor.visit_enum(s.into_deserializer()),
            Value::Document(doc) => {
                let mut iter = doc.into_iter();
                let (variant, value) = iter
                    .next()
                    .ok_or_else(|| de::Error::custom("empty document for enum variant"))?;
                if iter.next().is_some() {
                    return Err(de::Error::custom(
                        "enum variant documents hold exactly one key",
                    ));
                }
                visitor.visit_enum(VariantDocAccess { variant, value })
            }
            other => Err(Error::mismatch("an enum variant", other.kind())),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct ExpectedLen(usize);

impl de::Expected for ExpectedLen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} elements", self.0)
    }
}

/// Map access over a document's entries. In struct mode keys are
/// lower-cased and `_id` is handed to an `id_` field when the target has
/// one; in raw mode keys pass through untouched, since map keys are data.
struct DocAccess {
    iter: btree_map::IntoIter<String, Value>,
    pending: Option<Value>,
    fields: Option<&'static [&'static str]>,
}

impl DocAccess {
    fn raw(doc: Document) -> DocAccess {
        DocAccess {
            iter: doc.into_iter(),
            pending: None,
            fields: None,
        }
    }

    fn fields(doc: Document, fields: &'static [&'static str]) -> DocAccess {
        DocAccess {
            iter: doc.into_iter(),
            pending: None,
            fields: Some(fields),
        }
    }
}

impl<'de> MapAccess<'de> for DocAccess {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.iter.next() {
            None => Ok(None),
            Some((key, value)) => {
                self.pending = Some(value);
                let key = match self.fields {
                    None => key,
                    Some(fields) => {
                        let lowered = key.to_ascii_lowercase();
                        if lowered == "_id" && fields.contains(&"id_") {
                            "id_".to_owned()
                        } else {
                            lowered
                        }
                    }
                };
                seed.deserialize(StringDeserializer::new(key)).map(Some)
            }
        }
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<S::Value> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| de::Error::custom("next_value called before next_key"))?;
        seed.deserialize(Deserializer { value })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct ArrayAccess {
    iter: vec::IntoIter<Value>,
}

impl ArrayAccess {
    fn new(values: Vec<Value>) -> ArrayAccess {
        ArrayAccess {
            iter: values.into_iter(),
        }
    }

    fn bytes(data: &[u8]) -> ArrayAccess {
        ArrayAccess::new(data.iter().map(|b| Value::Int32((*b).into())).collect())
    }
}

impl<'de> SeqAccess<'de> for ArrayAccess {
    type Error = Error;

    fn next_element_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<Option<S::Value>> {
        match self.iter.next() {
            None => Ok(None),
            Some(value) => seed.deserialize(Deserializer { value }).map(Some),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Enum access for `{variant: payload}` documents.
struct VariantDocAccess {
    variant: String,
    value: Value,
}

impl<'de> EnumAccess<'de> for VariantDocAccess {
    type Error = Error;
    type Variant = VariantPayload;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, VariantPayload)> {
        let tag = seed.deserialize(StringDeserializer::new(self.variant))?;
        Ok((tag, VariantPayload { value: self.value }))
    }
}

struct VariantPayload {
    value: Value,
}

impl<'de> VariantAccess<'de> for VariantPayload {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(Error::mismatch("a unit variant", other.kind())),
        }
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<S::Value> {
        seed.deserialize(Deserializer { value: self.value })
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_tuple(Deserializer { value: self.value }, len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(Deserializer { value: self.value }, "", fields, visitor)
    }
}

/// The sending half of the exotic-kind channel: presents a kind without a
/// serde representation as an enum whose payload re-enters the normal
/// deserializer.
struct ExoticAccess {
    value: Value,
}

impl<'de> EnumAccess<'de> for ExoticAccess {
    type Error = Error;
    type Variant = ExoticPayload;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, ExoticPayload)> {
        let name = match self.value.kind() {
            Kind::ObjectId => "ObjectId",
            Kind::DateTime => "DateTime",
            Kind::Timestamp => "Timestamp",
            Kind::Regex => "Regex",
            Kind::Binary => "Binary",
            other => return Err(Error::mismatch("an exotic kind", other)),
        };
        let tag = seed.deserialize(StringDeserializer::new(name.to_owned()))?;
        Ok((tag, ExoticPayload { value: self.value }))
    }
}

struct ExoticPayload {
    value: Value,
}

impl<'de> VariantAccess<'de> for ExoticPayload {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Err(de::Error::custom("exotic kinds carry a payload"))
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<S::Value> {
        // Binary and regex payloads are delivered as transient documents
        // so derived part-structs can read them without ambiguity.
        let payload = match self.value {
            Value::Binary { subtype, data } => {
                let mut doc = Document::new();
                doc.insert("subtype", Value::Int32(subtype.into()));
                doc.insert("data", Value::binary(data));
                Value::Document(doc)
            }
            Value::Regex { pattern, options } => {
                let mut doc = Document::new();
                doc.insert("pattern", pattern);
                doc.insert("options", options);
                Value::Document(doc)
            }
            other => other,
        };
        seed.deserialize(Deserializer { value: payload })
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value> {
        Err(de::Error::custom("exotic kinds are newtype payloads"))
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(de::Error::custom("exotic kinds are newtype payloads"))
    }
}

#[derive(Deserialize)]
struct BinaryParts {
    subtype: u8,
    data: serde_bytes::ByteBuf,
}

#[derive(Deserialize)]
struct RegexParts {
    pattern: String,
    options: String,
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any document value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Boolean(v))
    }

    fn visit_i32<E: de::Error>(self, v: i32) -> std::result::Result<Value, E> {
        Ok(Value::Int32(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int64(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        i64::try_from(v)
            .map(Value::Int64)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Value, E> {
        Ok(Value::binary(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
        Ok(Value::binary(v))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: de::Deserializer<'de>>(
        self,
        d: D,
    ) -> std::result::Result<Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(v) = seq.next_element::<Value>()? {
            values.push(v);
        }
        Ok(Value::Array(values))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut doc = Document::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            doc.insert(k, v);
        }
        Ok(Value::Document(doc))
    }

    fn visit_enum<A: EnumAccess<'de>>(self, access: A) -> std::result::Result<Value, A::Error> {
        let (tag, payload): (String, _) = access.variant()?;
        match tag.as_str() {
            "ObjectId" => payload.newtype_variant::<crate::ObjectId>().map(Value::ObjectId),
            "DateTime" => payload.newtype_variant::<crate::DateTime>().map(Value::DateTime),
            "Timestamp" => payload.newtype_variant::<u64>().map(Value::Timestamp),
            "Regex" => payload.newtype_variant::<RegexParts>().map(|p| Value::Regex {
                pattern: p.pattern,
                options: p.options,
            }),
            "Binary" => payload.newtype_variant::<BinaryParts>().map(|p| Value::Binary {
                subtype: p.subtype,
                data: p.data.into_vec(),
            }),
            other => Err(de::Error::unknown_variant(other, EXOTIC_VARIANTS)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: de::Deserializer<'de>>(d: D) -> std::result::Result<Value, D::Error> {
        d.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: de::Deserializer<'de>>(d: D) -> std::result::Result<Document, D::Error> {
        match Value::deserialize(d)? {
            Value::Document(doc) => Ok(doc),
            other => Err(de::Error::custom(format!(
                "expected a document, got {}",
                other.kind()
            ))),
        }
    }
}
