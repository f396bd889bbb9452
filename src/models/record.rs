//! Typed result targets.
//!
//! Rows are materialized either as a single scalar (`FromValue`) or as a record whose
//! fields are populated through an explicit per-type mapping table (`FieldTable`).
//! The table is built once per type; fields of an embedded parent record can be
//! flattened into it with [`FieldTable::inherit`], where the child's own fields
//! shadow the parent's.

use crate::models::value::{Value, in_i64_range};
use std::collections::HashMap;
use std::sync::Arc;

/// Conversion from a column value into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, String>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Float(f) if f.fract() == 0.0 && in_i64_range(f) => Ok(f as i64),
            v => Err(unexpected("i64", &v)),
        }
    }
}

macro_rules! impl_from_value_narrow_int {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, String> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide)
                        .map_err(|_| format!("{} is out of range for {}", wide, stringify!($ty)))
                }
            }
        )+
    };
}

impl_from_value_narrow_int!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            v => Err(unexpected("f64", &v)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, String> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            v => Err(unexpected("bool", &v)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            v => Err(unexpected("String", &v)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            v => Err(unexpected("Vec<u8>", &v)),
        }
    }
}

fn unexpected(target: &str, value: &Value) -> String {
    if value.is_null() {
        format!("NULL cannot be read as {}; use Option<{}>", target, target)
    } else {
        format!("{} value cannot be read as {}", value.type_name(), target)
    }
}

type Setter<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), String> + Send + Sync>;
type Fallback<T> = Arc<dyn Fn(&mut T, &str, Value) -> Result<(), String> + Send + Sync>;

/// Per-type mapping table from field name to setter.
pub struct FieldTable<T> {
    construct: fn() -> T,
    fields: HashMap<&'static str, Setter<T>>,
    fallback: Option<Fallback<T>>,
}

impl<T: Default + 'static> FieldTable<T> {
    pub fn new() -> Self {
        Self {
            construct: T::default,
            fields: HashMap::new(),
            fallback: None,
        }
    }
}

impl<T: Default + 'static> Default for FieldTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> FieldTable<T> {
    /// Register a field; the column value is converted with `FromValue`.
    pub fn field<V, F>(mut self, name: &'static str, assign: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let setter: Setter<T> = Arc::new(move |target: &mut T, value: Value| {
            let v = V::from_value(value)?;
            assign(target, v);
            Ok(())
        });
        self.fields.insert(name, setter);
        self
    }

    /// Flatten the fields of an embedded parent record into this table.
    ///
    /// Fields already registered on `T` win over parent fields of the same name.
    pub fn inherit<P: 'static>(
        mut self,
        parent: &FieldTable<P>,
        project: fn(&mut T) -> &mut P,
    ) -> Self {
        for (&name, setter) in &parent.fields {
            if self.fields.contains_key(name) {
                continue;
            }
            let setter = Arc::clone(setter);
            let wrapped: Setter<T> =
                Arc::new(move |target: &mut T, value: Value| setter(project(target), value));
            self.fields.insert(name, wrapped);
        }
        self
    }

    /// Accept columns that name no registered field.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&mut T, &str, Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fallback.is_some() || self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    pub(crate) fn construct(&self) -> T {
        (self.construct)()
    }

    /// Look up the setter for a field, falling back to the open-record handler.
    pub(crate) fn setter(&self, name: &str) -> Option<FieldSetter<T>> {
        if let Some(setter) = self.fields.get(name) {
            return Some(FieldSetter::Named(Arc::clone(setter)));
        }
        self.fallback
            .as_ref()
            .map(|f| FieldSetter::Open(Arc::clone(f), name.to_string()))
    }
}

impl<T> std::fmt::Debug for FieldTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.fields.keys().collect();
        names.sort();
        f.debug_struct("FieldTable")
            .field("type", &std::any::type_name::<T>())
            .field("fields", &names)
            .field("open", &self.fallback.is_some())
            .finish()
    }
}

/// A resolved setter, looked up once per call.
pub(crate) enum FieldSetter<T> {
    Named(Setter<T>),
    Open(Fallback<T>, String),
}

impl<T> FieldSetter<T> {
    pub(crate) fn assign(&self, target: &mut T, value: Value) -> Result<(), String> {
        match self {
            Self::Named(setter) => setter(target, value),
            Self::Open(fallback, name) => fallback(target, name, value),
        }
    }
}

/// A type rows can be materialized into.
///
/// Scalars read one raw column; records expose a field table. A type that offers
/// neither cannot be produced by a result mapping.
pub trait ResultType: Sized + 'static {
    /// Field table for encapsulated results; `None` for scalar types.
    fn field_table() -> Option<&'static FieldTable<Self>> {
        None
    }

    /// Read a single raw column as this type.
    fn from_column(value: Value) -> Result<Self, String> {
        let _ = value;
        Err(format!(
            "{} is a record type and cannot be read from a single column",
            std::any::type_name::<Self>()
        ))
    }
}

macro_rules! impl_scalar_result {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ResultType for $ty {
                fn from_column(value: Value) -> Result<Self, String> {
                    <$ty as FromValue>::from_value(value)
                }
            }

            impl ResultType for Option<$ty> {
                fn from_column(value: Value) -> Result<Self, String> {
                    <Option<$ty> as FromValue>::from_value(value)
                }
            }
        )+
    };
}

impl_scalar_result!(
    i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool, String, Vec<u8>
);

impl ResultType for Value {
    fn from_column(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

/// Open record that keeps every mapped column, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRecord(pub serde_json::Map<String, serde_json::Value>);

impl ResultType for JsonRecord {
    fn field_table() -> Option<&'static FieldTable<Self>> {
        static TABLE: std::sync::OnceLock<FieldTable<JsonRecord>> = std::sync::OnceLock::new();
        Some(TABLE.get_or_init(|| {
            FieldTable::new().with_fallback(|record: &mut JsonRecord, name, value| {
                let json = serde_json::to_value(&value).map_err(|e| e.to_string())?;
                record.0.insert(name.to_string(), json);
                Ok(())
            })
        }))
    }
}
