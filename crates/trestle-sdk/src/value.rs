//! HostValue — the host system's generic value type
//!
//! A closed set of interchange kinds: null, bool, 64-bit integer, IEEE-754
//! double, UTF-8 string, byte sequence, ordered list, string-keyed map, and
//! two date/time shapes (absolute timestamp with a fixed UTC offset, and
//! relative duration). Host objects ride along as [`HostObject`] handles.

use std::collections::HashMap;

use crate::object::HostObject;

/// Absolute point in time with a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Microseconds since the Unix epoch (UTC)
    pub epoch_micros: i64,
    /// UTC offset of the originating zone, in seconds
    pub offset_secs: i32,
}

impl Timestamp {
    /// Create a timestamp from epoch microseconds and a UTC offset
    pub fn new(epoch_micros: i64, offset_secs: i32) -> Self {
        Self {
            epoch_micros,
            offset_secs,
        }
    }

    /// Create a UTC timestamp from epoch microseconds
    pub fn utc(epoch_micros: i64) -> Self {
        Self::new(epoch_micros, 0)
    }
}

/// Relative duration, stored as total microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    /// Signed total length in microseconds
    pub micros: i64,
}

impl Duration {
    /// Create a duration from total microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a duration from whole seconds
    pub fn from_secs(secs: i64) -> Self {
        Self {
            micros: secs * 1_000_000,
        }
    }

    /// Total length in whole seconds (truncated)
    pub fn as_secs(&self) -> i64 {
        self.micros / 1_000_000
    }
}

/// Generic host value.
///
/// Lists preserve element order; map key order is not significant. Equality
/// on `Object` is handle identity, not structural.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Absent / null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// IEEE-754 double
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Byte sequence
    Bytes(Vec<u8>),
    /// Ordered list
    List(Vec<HostValue>),
    /// String-keyed map
    Map(HashMap<String, HostValue>),
    /// Absolute timestamp with UTC offset
    Timestamp(Timestamp),
    /// Relative duration
    Duration(Duration),
    /// Host object handle
    Object(HostObject),
}

impl HostValue {
    /// Kind name for diagnostics and conversion errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::Bytes(_) => "bytes",
            HostValue::List(_) => "list",
            HostValue::Map(_) => "map",
            HostValue::Timestamp(_) => "timestamp",
            HostValue::Duration(_) => "duration",
            HostValue::Object(_) => "object",
        }
    }

    /// Check if this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get as boolean if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as byte slice if this is a byte sequence
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as element slice if this is a list
    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get as map reference if this is a map
    pub fn as_map(&self) -> Option<&HashMap<String, HostValue>> {
        match self {
            HostValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get as timestamp if this is a timestamp
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            HostValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Get as duration if this is a duration
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            HostValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as object handle if this is an object
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl Default for HostValue {
    fn default() -> Self {
        HostValue::Null
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Int(i as i64)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::List(items)
    }
}

impl From<HostObject> for HostValue {
    fn from(o: HostObject) -> Self {
        HostValue::Object(o)
    }
}
