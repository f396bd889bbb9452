//! Parameter and column values.
//!
//! This module defines the runtime value model shared by binding and result mapping,
//! the SQL type tags declared in operation metadata, and the per-call parameter
//! values including multi-valued membership (IN clause) lists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single SQL value, as bound to a statement or read from a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Declared SQL type of a parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Text,
    Blob,
    Date,
    Timestamp,
    /// Leave the value as supplied.
    Any,
}

impl SqlType {
    /// Coerce a value to this declared type.
    ///
    /// NULL passes through untouched; the nullability decision belongs to the caller.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Any, v) => Ok(v),

            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (Self::Boolean, Value::Text(s)) => parse_bool(&s)
                .map(Value::Bool)
                .ok_or_else(|| format!("'{}' is not a boolean", s)),

            (t, Value::Int(i)) if t.is_integer() => t.check_range(i).map(Value::Int),
            (t, Value::Bool(b)) if t.is_integer() => Ok(Value::Int(i64::from(b))),
            (t, Value::Float(f)) if t.is_integer() => {
                if f.fract() != 0.0 {
                    Err(format!("{} has a fractional part", f))
                } else if in_i64_range(f) {
                    t.check_range(f as i64).map(Value::Int)
                } else {
                    Err(format!("{} is out of range for {:?}", f, t))
                }
            }
            (t, Value::Text(s)) if t.is_integer() => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{}' is not an integer", s))
                .and_then(|i| t.check_range(i))
                .map(Value::Int),

            (t, Value::Float(f)) if t.is_float() => Ok(Value::Float(f)),
            (t, Value::Int(i)) if t.is_float() => Ok(Value::Float(i as f64)),
            (t, Value::Text(s)) if t.is_float() => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", s)),

            (t, Value::Text(s)) if t.is_textual() => Ok(Value::Text(s)),
            (t, Value::Int(i)) if t.is_textual() => Ok(Value::Text(i.to_string())),
            (t, Value::Float(f)) if t.is_textual() => Ok(Value::Text(f.to_string())),
            (t, Value::Bool(b)) if t.is_textual() => Ok(Value::Text(b.to_string())),
            (t, Value::Bytes(b)) if t.is_textual() => String::from_utf8(b)
                .map(Value::Text)
                .map_err(|_| "binary value is not valid UTF-8".to_string()),

            (Self::Blob, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (Self::Blob, Value::Text(s)) => Ok(Value::Bytes(s.into_bytes())),

            (t, v) => Err(format!("cannot convert {} to {:?}", v.type_name(), t)),
        }
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt
        )
    }

    fn is_float(self) -> bool {
        matches!(self, Self::Real | Self::Double | Self::Numeric)
    }

    fn is_textual(self) -> bool {
        matches!(
            self,
            Self::Char | Self::Varchar | Self::Text | Self::Date | Self::Timestamp
        )
    }

    fn check_range(self, i: i64) -> Result<i64, String> {
        let (min, max) = match self {
            Self::TinyInt => (i64::from(i8::MIN), i64::from(i8::MAX)),
            Self::SmallInt => (i64::from(i16::MIN), i64::from(i16::MAX)),
            Self::Integer => (i64::from(i32::MIN), i64::from(i32::MAX)),
            _ => (i64::MIN, i64::MAX),
        };
        if (min..=max).contains(&i) {
            Ok(i)
        } else {
            Err(format!("{} is out of range for {:?}", i, self))
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Whether a whole float converts to `i64` without saturating.
///
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
pub(crate) fn in_i64_range(f: f64) -> bool {
    f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Dynamic member list for the one membership-clause parameter of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipValues {
    values: Vec<Value>,
}

impl MembershipValues {
    pub fn new<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of members; zero when empty.
    pub fn count(&self) -> usize {
        self.values.len()
    }
}

impl<V: Into<Value>> FromIterator<V> for MembershipValues {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// One logical parameter value passed to an operation, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Value(Value),
    Members(MembershipValues),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn null() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Value> for QueryParam {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<MembershipValues> for QueryParam {
    fn from(v: MembershipValues) -> Self {
        Self::Members(v)
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident via $conv:expr),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant($conv(v))
                }
            }

            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    QueryParam::Value(Value::from(v))
                }
            }
        )+
    };
}

impl_value_from!(
    bool => Bool via std::convert::identity,
    i8 => Int via i64::from,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    i64 => Int via std::convert::identity,
    u8 => Int via i64::from,
    u16 => Int via i64::from,
    u32 => Int via i64::from,
    f32 => Float via f64::from,
    f64 => Float via std::convert::identity,
    String => Text via std::convert::identity,
    Vec<u8> => Bytes via std::convert::identity,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        QueryParam::Value(Value::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        QueryParam::Value(Value::from(v))
    }
}

/// Build a parameter list from heterogeneous values.
///
/// ```
/// use sqldao::{params, MembershipValues};
/// let p = params![37, MembershipValues::new([5, 6, 7]), "x"];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::models::QueryParam>::new() };
    ($($p:expr),+ $(,)?) => {
        vec![$($crate::models::QueryParam::from($p)),+]
    };
}
