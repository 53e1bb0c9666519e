//! Sinks driven by the decoder.
//!
//! The decoder never knows what it is producing: it pushes scalars and
//! descends into containers through the [`Builder`] trait. [`TreeBuilder`]
//! grows a [`Value`] tree in place; [`NoopBuilder`] discards everything and
//! turns a decode into a pure well-formedness check.

use crate::document::Document;
use crate::value::Value;

/// A sink for decoded elements.
///
/// `key`/`elem` return a child builder anchored at the named slot of the
/// current container; the decoder recurses through children for embedded
/// documents and arrays. `flush` runs after each completed element, for
/// sinks that stage writes before committing them to a parent.
pub trait Builder {
    type Child<'a>: Builder
    where
        Self: 'a;

    fn float64(&mut self, value: f64);
    fn int32(&mut self, value: i32);
    fn int64(&mut self, value: i64);
    fn string(&mut self, value: &str);
    fn boolean(&mut self, value: bool);
    fn date_millis(&mut self, millis: i64);
    fn timestamp(&mut self, value: u64);
    fn object_id(&mut self, bytes: [u8; 12]);
    fn regex(&mut self, pattern: &str, options: &str);
    fn binary(&mut self, data: &[u8], subtype: u8);
    fn null(&mut self);

    /// Prepares the current slot to receive document fields.
    fn object(&mut self);
    /// Prepares the current slot to receive array elements.
    fn array(&mut self);

    fn key(&mut self, name: &str) -> Self::Child<'_>;
    fn elem(&mut self, index: usize) -> Self::Child<'_>;

    fn flush(&mut self);
}

/// Builds a [`Value`] tree. Each builder is anchored at one mutable slot;
/// writes land in place, so `flush` has nothing to do.
pub struct TreeBuilder<'a> {
    slot: &'a mut Value,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(slot: &'a mut Value) -> TreeBuilder<'a> {
        TreeBuilder { slot }
    }

    fn put(&mut self, value: Value) {
        *self.slot = value;
    }
}

impl<'s> Builder for TreeBuilder<'s> {
    type Child<'a>
        = TreeBuilder<'a>
    where
        Self: 'a;

    fn float64(&mut self, value: f64) {
        self.put(Value::Double(value));
    }

    fn int32(&mut self, value: i32) {
        self.put(Value::Int32(value));
    }

    fn int64(&mut self, value: i64) {
        self.put(Value::Int64(value));
    }

    fn string(&mut self, value: &str) {
        self.put(Value::String(value.to_owned()));
    }

    fn boolean(&mut self, value: bool) {
        self.put(Value::Boolean(value));
    }

    fn date_millis(&mut self, millis: i64) {
        self.put(Value::DateTime(crate::DateTime::from_millis(millis)));
    }

    fn timestamp(&mut self, value: u64) {
        self.put(Value::Timestamp(value));
    }

    fn object_id(&mut self, bytes: [u8; 12]) {
        self.put(Value::ObjectId(crate::ObjectId::from_bytes(bytes)));
    }

    fn regex(&mut self, pattern: &str, options: &str) {
        self.put(Value::Regex {
            pattern: pattern.to_owned(),
            options: options.to_owned(),
        });
    }

    fn binary(&mut self, data: &[u8], subtype: u8) {
        self.put(Value::Binary {
            subtype,
            data: data.to_vec(),
        });
    }

    fn null(&mut self) {
        self.put(Value::Null);
    }

    fn object(&mut self) {
        self.put(Value::Document(Document::new()));
    }

    fn array(&mut self) {
        self.put(Value::Array(Vec::new()));
    }

    fn key(&mut self, name: &str) -> TreeBuilder<'_> {
        match &mut *self.slot {
            Value::Document(doc) => TreeBuilder {
                slot: doc.entry(name),
            },
            // Array slots accept any key string; non-numeric keys append.
            Value::Array(arr) => {
                let index = name.parse().unwrap_or(arr.len());
                array_slot(arr, index)
            }
            other => TreeBuilder { slot: other },
        }
    }

    fn elem(&mut self, index: usize) -> TreeBuilder<'_> {
        match &mut *self.slot {
            Value::Array(arr) => array_slot(arr, index),
            other => TreeBuilder { slot: other },
        }
    }

    fn flush(&mut self) {}
}

/// Grows the array up to `index`, Null-filling the gap.
fn array_slot(arr: &mut Vec<Value>, index: usize) -> TreeBuilder<'_> {
    while arr.len() <= index {
        arr.push(Value::Null);
    }
    TreeBuilder {
        slot: &mut arr[index],
    }
}

/// Discards every write. Driving the decoder with this validates the byte
/// stream without materializing a tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBuilder;

impl Builder for NoopBuilder {
    type Child<'a>
        = NoopBuilder
    where
        Self: 'a;

    fn float64(&mut self, _: f64) {}
    fn int32(&mut self, _: i32) {}
    fn int64(&mut self, _: i64) {}
    fn string(&mut self, _: &str) {}
    fn boolean(&mut self, _: bool) {}
    fn date_millis(&mut self, _: i64) {}
    fn timestamp(&mut self, _: u64) {}
    fn object_id(&mut self, _: [u8; 12]) {}
    fn regex(&mut self, _: &str, _: &str) {}
    fn binary(&mut self, _: &[u8], _: u8) {}
    fn null(&mut self) {}
    fn object(&mut self) {}
    fn array(&mut self) {}

    fn key(&mut self, _: &str) -> NoopBuilder {
        NoopBuilder
    }

    fn elem(&mut self, _: usize) -> NoopBuilder {
        NoopBuilder
    }

    fn flush(&mut self) {}
}
