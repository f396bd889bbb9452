//! Row-to-type materialization.
//!
//! Column positions and field setters are resolved once per call against the result
//! set's header, then applied to every row.

use crate::db::session::Rows;
use crate::error::{DaoError, DaoResult};
use crate::models::record::FieldSetter;
use crate::models::{ResultSpec, ResultType, SqlType, Value};

/// Check that `T` can be produced by `result`.
///
/// Runs at registration through `Operation::returning` and again at the start of
/// every mapping call, so a missing field is reported before any row is read.
pub fn check_result_type<T: ResultType>(result: &ResultSpec) -> DaoResult<()> {
    let type_name = std::any::type_name::<T>();
    match (result.encapsulate, T::field_table()) {
        (true, None) => Err(DaoError::result_mapping(
            type_name,
            "scalar types cannot hold an encapsulated result; declare a record type",
        )),
        (true, Some(table)) => {
            for column in &result.columns {
                if !table.contains(&column.field_name) {
                    return Err(DaoError::result_mapping(
                        type_name,
                        format!(
                            "no field '{}' for column '{}'",
                            column.field_name, column.column_name
                        ),
                    ));
                }
            }
            Ok(())
        }
        (false, Some(_)) => Err(DaoError::result_mapping(
            type_name,
            "record types cannot be read from a single raw column",
        )),
        (false, None) => Ok(()),
    }
}

/// Read at most one value: the first row, or `None` when the result set is empty.
pub fn map_one<T: ResultType>(mut rows: Rows, result: &ResultSpec) -> DaoResult<Option<T>> {
    let plan = Plan::<T>::resolve(&rows, result)?;
    rows.next()
        .map(|row| plan.materialize(row.into_values()))
        .transpose()
}

/// Read every row in order; an empty result set yields an empty vector.
pub fn map_all<T: ResultType>(rows: Rows, result: &ResultSpec) -> DaoResult<Vec<T>> {
    let plan = Plan::<T>::resolve(&rows, result)?;
    let mut out = Vec::with_capacity(rows.remaining());
    for row in rows {
        out.push(plan.materialize(row.into_values())?);
    }
    Ok(out)
}

enum Plan<T: 'static> {
    Scalar {
        index: usize,
        value_type: Option<SqlType>,
    },
    Record {
        table: &'static crate::models::FieldTable<T>,
        fields: Vec<(usize, Option<SqlType>, FieldSetter<T>)>,
    },
}

impl<T: ResultType> Plan<T> {
    fn resolve(rows: &Rows, result: &ResultSpec) -> DaoResult<Self> {
        check_result_type::<T>(result)?;
        let type_name = std::any::type_name::<T>();
        let columns = rows.columns();

        if !result.encapsulate {
            let column = result.columns.first().ok_or_else(|| {
                DaoError::configuration("a non-encapsulated result declares no column")
            })?;
            // Scalar queries sometimes alias their only column; fall back to position 0.
            let index = column_index(columns, &column.column_name).unwrap_or(0);
            return Ok(Self::Scalar {
                index,
                value_type: column.value_type,
            });
        }

        let Some(table) = T::field_table() else {
            return Err(DaoError::result_mapping(type_name, "type has no field table"));
        };
        let mut fields = Vec::with_capacity(result.columns.len());
        for column in &result.columns {
            // An empty result set may carry no header at all; nothing will be read then.
            if columns.is_empty() {
                break;
            }
            let index = column_index(columns, &column.column_name).ok_or_else(|| {
                DaoError::result_mapping(
                    type_name,
                    format!("column '{}' is not in the result set", column.column_name),
                )
            })?;
            let setter = table.setter(&column.field_name).ok_or_else(|| {
                DaoError::result_mapping(type_name, format!("no field '{}'", column.field_name))
            })?;
            fields.push((index, column.value_type, setter));
        }
        Ok(Self::Record { table, fields })
    }

    fn materialize(&self, values: Vec<Value>) -> DaoResult<T> {
        let type_name = std::any::type_name::<T>();
        match self {
            Self::Scalar { index, value_type } => {
                let value = column_value(&values, *index, type_name)?;
                let value = read_as(value, *value_type, type_name)?;
                T::from_column(value).map_err(|msg| DaoError::result_mapping(type_name, msg))
            }
            Self::Record { table, fields } => {
                let mut target = table.construct();
                for (index, value_type, setter) in fields {
                    let value = column_value(&values, *index, type_name)?;
                    let value = read_as(value, *value_type, type_name)?;
                    setter
                        .assign(&mut target, value)
                        .map_err(|msg| DaoError::result_mapping(type_name, msg))?;
                }
                Ok(target)
            }
        }
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
}

/// Copy out one column; several fields may read the same column.
fn column_value(values: &[Value], index: usize, type_name: &str) -> DaoResult<Value> {
    values
        .get(index)
        .cloned()
        .ok_or_else(|| DaoError::result_mapping(type_name, format!("row has no column {}", index)))
}

fn read_as(value: Value, value_type: Option<SqlType>, type_name: &str) -> DaoResult<Value> {
    match value_type {
        Some(t) => t
            .coerce(value)
            .map_err(|msg| DaoError::result_mapping(type_name, msg)),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, FieldTable, JsonRecord};
    use std::sync::OnceLock;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: i64,
        name: String,
        email: Option<String>,
    }

    impl ResultType for Person {
        fn field_table() -> Option<&'static FieldTable<Self>> {
            static TABLE: OnceLock<FieldTable<Person>> = OnceLock::new();
            Some(TABLE.get_or_init(|| {
                FieldTable::new()
                    .field("id", |p: &mut Person, v| p.id = v)
                    .field("name", |p: &mut Person, v| p.name = v)
                    .field("email", |p: &mut Person, v| p.email = v)
            }))
        }
    }

    fn person_rows() -> Rows {
        Rows::new(
            vec!["id".into(), "name".into(), "e_mail".into()],
            vec![
                vec![
                    Value::Int(101),
                    Value::Text("Sanjaya Karunasena".into()),
                    Value::Text("sanjaya@example.com".into()),
                ],
                vec![Value::Int(102), Value::Text("Chathura Welgama".into()), Value::Null],
            ],
        )
    }

    fn person_spec() -> ResultSpec {
        ResultSpec::record([
            ColumnSpec::new("id"),
            ColumnSpec::new("name"),
            ColumnSpec::new("e_mail").to_field("email"),
        ])
    }

    #[test]
    fn test_map_one_takes_first_row() {
        let person: Option<Person> = map_one(person_rows(), &person_spec()).unwrap();
        let person = person.unwrap();
        assert_eq!(person.id, 101);
        assert_eq!(person.email.as_deref(), Some("sanjaya@example.com"));
    }

    #[test]
    fn test_map_one_empty_is_none() {
        let person: Option<Person> = map_one(Rows::empty(), &person_spec()).unwrap();
        assert!(person.is_none());
    }

    #[test]
    fn test_map_all_preserves_row_order() {
        let people: Vec<Person> = map_all(person_rows(), &person_spec()).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].id, 101);
        assert_eq!(people[1].name, "Chathura Welgama");
        assert_eq!(people[1].email, None);
    }

    #[test]
    fn test_map_all_empty_is_empty_vec() {
        let people: Vec<Person> = map_all(Rows::empty(), &person_spec()).unwrap();
        assert!(people.is_empty());
    }

    #[test]
    fn test_scalar_reads_named_column() {
        let rows = Rows::new(
            vec!["id".into()],
            vec![vec![Value::Int(101)], vec![Value::Int(102)]],
        );
        let ids: Vec<i64> = map_all(rows, &ResultSpec::scalar(ColumnSpec::new("id"))).unwrap();
        assert_eq!(ids, vec![101, 102]);
    }

    #[test]
    fn test_value_type_coerces_column() {
        let rows = Rows::new(vec!["age".into()], vec![vec![Value::Text("25".into())]]);
        let spec = ResultSpec::scalar(ColumnSpec::new("age").typed(SqlType::Integer));
        let age: Option<i32> = map_one(rows, &spec).unwrap();
        assert_eq!(age, Some(25));
    }

    #[test]
    fn test_missing_field_is_mapping_error() {
        let spec = ResultSpec::record([ColumnSpec::new("id"), ColumnSpec::new("city")]);
        assert!(matches!(
            check_result_type::<Person>(&spec),
            Err(DaoError::ResultMapping { .. })
        ));
        assert!(matches!(
            map_all::<Person>(person_rows(), &spec),
            Err(DaoError::ResultMapping { .. })
        ));
    }

    #[test]
    fn test_encapsulating_scalar_is_mapping_error() {
        assert!(matches!(
            map_one::<i64>(person_rows(), &person_spec()),
            Err(DaoError::ResultMapping { .. })
        ));
        assert!(matches!(
            check_result_type::<Person>(&ResultSpec::scalar(ColumnSpec::new("id"))),
            Err(DaoError::ResultMapping { .. })
        ));
    }

    #[test]
    fn test_json_record_collects_mapped_columns() {
        let records: Vec<JsonRecord> = map_all(person_rows(), &person_spec()).unwrap();
        assert_eq!(records[0].0["email"], serde_json::json!("sanjaya@example.com"));
        assert_eq!(records[1].0["email"], serde_json::Value::Null);
    }

    #[test]
    fn test_same_column_feeds_two_fields() {
        #[derive(Debug, Default)]
        struct Membership {
            id: i64,
            person_id: i64,
        }

        impl ResultType for Membership {
            fn field_table() -> Option<&'static FieldTable<Self>> {
                static TABLE: OnceLock<FieldTable<Membership>> = OnceLock::new();
                Some(TABLE.get_or_init(|| {
                    FieldTable::new()
                        .field("id", |m: &mut Membership, v| m.id = v)
                        .field("person_id", |m: &mut Membership, v| m.person_id = v)
                }))
            }
        }

        let rows = Rows::new(vec!["id".into()], vec![vec![Value::Int(7)]]);
        let spec = ResultSpec::record([
            ColumnSpec::new("id"),
            ColumnSpec::new("id").to_field("person_id"),
        ]);
        let m: Membership = map_one(rows, &spec).unwrap().unwrap();
        assert_eq!((m.id, m.person_id), (7, 7));
    }
}
