//! Millisecond-precision timestamps for the datetime element.

use chrono::{TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype token the serde layer uses to route datetimes onto the
/// DateTime element kind instead of a plain integer.
pub(crate) const NEWTYPE_TOKEN: &str = "$docdb_bson::DateTime";

/// A point in time with millisecond precision, as carried by the datetime
/// element. Always milliseconds since the Unix epoch, never seconds.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(i64);

impl DateTime {
    /// The Unix epoch.
    pub const EPOCH: DateTime = DateTime(0);

    pub fn from_millis(millis: i64) -> DateTime {
        DateTime(millis)
    }

    pub fn now() -> DateTime {
        DateTime(Utc::now().timestamp_millis())
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0
    }

    pub fn from_chrono(dt: chrono::DateTime<Utc>) -> DateTime {
        DateTime(dt.timestamp_millis())
    }

    /// `None` only for values outside chrono's representable range.
    pub fn to_chrono(&self) -> Option<chrono::DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "DateTime({})", dt.to_rfc3339()),
            None => write!(f, "DateTime({} ms)", self.0),
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => f.write_str(&dt.to_rfc3339()),
            None => write!(f, "{} ms", self.0),
        }
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(dt: chrono::DateTime<Utc>) -> DateTime {
        DateTime::from_chrono(dt)
    }
}

impl Serialize for DateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(NEWTYPE_TOKEN, &self.0)
    }
}

struct MillisVisitor;

impl<'de> Visitor<'de> for MillisVisitor {
    type Value = DateTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("milliseconds since the epoch")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DateTime, E> {
        Ok(DateTime(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DateTime, E> {
        i64::try_from(v)
            .map(DateTime)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<DateTime, D::Error> {
        d.deserialize_i64(self)
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<DateTime, D::Error> {
        deserializer.deserialize_newtype_struct(NEWTYPE_TOKEN, MillisVisitor)
    }
}
