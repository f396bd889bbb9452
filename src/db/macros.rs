//! Declarative macros for record result types.
//!
//! These expand into the same `FieldTable` builder calls a hand-written
//! `ResultType` impl would make.

/// Build a `FieldTable` whose field names equal the struct's field names.
///
/// # Example
///
/// ```
/// use sqldao::field_table;
///
/// #[derive(Default)]
/// struct Person {
///     id: i64,
///     name: String,
/// }
///
/// let table = field_table!(Person { id, name });
/// assert!(table.contains("name"));
/// ```
#[macro_export]
macro_rules! field_table {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        $crate::models::FieldTable::<$ty>::new()
            $(.field(stringify!($field), |target: &mut $ty, value| target.$field = value))*
    };
}

/// Implement `ResultType` for a record struct, building its field table once.
///
/// A trailing `inherit` clause flattens an embedded parent record; the record's own
/// fields shadow the parent's.
///
/// ```ignore
/// record_type!(Employee { id, salary } inherit person: Person);
/// ```
#[macro_export]
macro_rules! record_type {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::models::ResultType for $ty {
            fn field_table() -> Option<&'static $crate::models::FieldTable<Self>> {
                static TABLE: std::sync::OnceLock<$crate::models::FieldTable<$ty>> =
                    std::sync::OnceLock::new();
                Some(TABLE.get_or_init(|| $crate::field_table!($ty { $($field),* })))
            }
        }
    };
    ($ty:ty { $($field:ident),* $(,)? } inherit $embed:ident : $parent:ty) => {
        impl $crate::models::ResultType for $ty {
            fn field_table() -> Option<&'static $crate::models::FieldTable<Self>> {
                static TABLE: std::sync::OnceLock<$crate::models::FieldTable<$ty>> =
                    std::sync::OnceLock::new();
                Some(TABLE.get_or_init(|| {
                    let table = $crate::field_table!($ty { $($field),* });
                    match <$parent as $crate::models::ResultType>::field_table() {
                        Some(parent) => table.inherit(parent, |t: &mut $ty| &mut t.$embed),
                        None => table,
                    }
                }))
            }
        }
    };
}
