//! The dynamic value type used by the schemaless codec and `Any` fields.

use std::collections::BTreeMap;

use bytes::Bytes;

/// The schemaless representation of a struct: a map from tags to values.
///
/// Iteration order is ascending by tag, which is also the emit order on
/// encode.
pub type StructMap = BTreeMap<u8, TarsValue>;

/// A dynamically-typed JCE value.
///
/// `Struct` is deliberately distinct from `Map` even though both hold
/// key/value pairs: the wire frames them with different type codes
/// (`StructBegin`/`StructEnd` vs `Map`) and the writer re-emits whichever
/// form a value was decoded from.
///
/// `Map` keeps its pairs as a vector in wire order; the decoder never
/// reorders them and map keys are not required to be hashable.
#[derive(Debug, Clone, PartialEq)]
pub enum TarsValue {
    Bool(bool),
    /// All integer widths promote to `i64`; the writer re-compacts.
    Int(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<TarsValue>),
    Map(Vec<(TarsValue, TarsValue)>),
    Struct(StructMap),
}

impl TarsValue {
    /// A short human-readable name for the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool value",
            Self::Int(_) => "int value",
            Self::Float(_) => "float value",
            Self::Double(_) => "double value",
            Self::Str(_) => "string value",
            Self::Bytes(_) => "bytes value",
            Self::List(_) => "list value",
            Self::Map(_) => "map value",
            Self::Struct(_) => "struct value",
        }
    }

    /// Build a `Bytes` value from anything convertible.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TarsValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(TarsValue, TarsValue)]> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructMap> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for TarsValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for TarsValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for TarsValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i16> for TarsValue {
    fn from(v: i16) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i8> for TarsValue {
    fn from(v: i8) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f32> for TarsValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for TarsValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for TarsValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for TarsValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bytes> for TarsValue {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<TarsValue>> for TarsValue {
    fn from(v: Vec<TarsValue>) -> Self {
        Self::List(v)
    }
}

impl From<StructMap> for TarsValue {
    fn from(v: StructMap) -> Self {
        Self::Struct(v)
    }
}
