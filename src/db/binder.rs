//! Positional parameter binding.
//!
//! Logical parameters are declared at 1-based positions before membership expansion.
//! Once a member list of `k` values has been bound, every later declared position
//! moves right by `k - 1`, since the template reserved one slot for the whole list.

use crate::db::statement::single_membership;
use crate::error::{DaoError, DaoResult};
use crate::models::{ParamSpec, QueryParam, SqlType, Value};
use tracing::trace;

/// Statement text plus the physical parameter slots bound so far.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    sql: String,
    slots: Vec<Option<Value>>,
}

impl PreparedStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            slots: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind a value at a 1-based physical position.
    pub fn set(&mut self, position: usize, value: Value) -> DaoResult<()> {
        if position == 0 {
            return Err(DaoError::configuration(
                "parameter positions are 1-based; position 0 is invalid",
            ));
        }
        if self.slots.len() < position {
            self.slots.resize(position, None);
        }
        self.slots[position - 1] = Some(value);
        Ok(())
    }

    /// Bind SQL NULL at a 1-based physical position.
    pub fn set_null(&mut self, position: usize, sql_type: SqlType) -> DaoResult<()> {
        trace!(position, ?sql_type, "Binding NULL");
        self.set(position, Value::Null)
    }

    /// Physical value at a 1-based position, if bound.
    pub fn get(&self, position: usize) -> Option<&Value> {
        position
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
    }

    pub fn bound_count(&self) -> usize {
        self.slots.len()
    }

    /// Consume the statement, yielding text and values in physical order.
    ///
    /// Fails if a position below the highest bound one was never bound.
    pub fn into_parts(self) -> DaoResult<(String, Vec<Value>)> {
        let mut values = Vec::with_capacity(self.slots.len());
        for (idx, slot) in self.slots.into_iter().enumerate() {
            match slot {
                Some(v) => values.push(v),
                None => {
                    return Err(DaoError::configuration(format!(
                        "physical parameter {} was never bound",
                        idx + 1
                    )));
                }
            }
        }
        Ok((self.sql, values))
    }
}

/// Check parameter values against their specs without touching any statement.
///
/// Run before the statement is built so null and shape defects surface before any
/// backend work happens.
pub fn validate(
    params: &[QueryParam],
    specs: &[ParamSpec],
    has_membership_clause: bool,
) -> DaoResult<()> {
    if params.len() != specs.len() {
        return Err(DaoError::configuration(format!(
            "{} parameter values supplied but {} parameters declared",
            params.len(),
            specs.len()
        )));
    }

    let members = single_membership(params)?;
    if members.is_some() && !has_membership_clause {
        return Err(DaoError::configuration(
            "a member list was supplied to a query without a membership clause",
        ));
    }

    for (i, (param, spec)) in params.iter().zip(specs).enumerate() {
        check_order(i, spec)?;
        match param {
            QueryParam::Value(Value::Null) if !spec.nullable => {
                return Err(DaoError::invalid_parameter(
                    spec.position,
                    format!("parameter {} cannot be null", spec.position),
                ));
            }
            QueryParam::Value(Value::Null) => {}
            QueryParam::Value(v) => {
                coerce(spec, v.clone())?;
            }
            QueryParam::Members(m) => {
                for v in m.values() {
                    check_member(spec, v)?;
                    coerce(spec, v.clone())?;
                }
            }
        }
    }
    Ok(())
}

/// Bind logical parameters onto the statement's physical positions.
pub fn bind(
    statement: &mut PreparedStatement,
    params: &[QueryParam],
    specs: &[ParamSpec],
) -> DaoResult<()> {
    let mut index_shift: usize = 0;

    for (i, param) in params.iter().enumerate() {
        let spec = specs.get(i).ok_or_else(|| {
            DaoError::configuration(format!("no parameter spec declared for parameter {}", i + 1))
        })?;
        check_order(i, spec)?;
        let position = spec.position + index_shift;

        match param {
            QueryParam::Value(Value::Null) => {
                if !spec.nullable {
                    return Err(DaoError::invalid_parameter(
                        spec.position,
                        format!("parameter {} cannot be null", spec.position),
                    ));
                }
                statement.set_null(position, spec.sql_type)?;
            }
            QueryParam::Value(v) => {
                statement.set(position, coerce(spec, v.clone())?)?;
            }
            QueryParam::Members(members) if members.count() == 0 => {
                // The template keeps one placeholder; NULL makes `IN (NULL)` match nothing.
                statement.set_null(position, spec.sql_type)?;
            }
            QueryParam::Members(members) => {
                for (offset, v) in members.values().iter().enumerate() {
                    check_member(spec, v)?;
                    statement.set(position + offset, coerce(spec, v.clone())?)?;
                }
                index_shift += members.count() - 1;
            }
        }
    }
    Ok(())
}

fn check_order(i: usize, spec: &ParamSpec) -> DaoResult<()> {
    if spec.position != i + 1 {
        return Err(DaoError::configuration(format!(
            "parameter spec order does not match the parameter value order: \
             spec at index {} declares position {}",
            i, spec.position
        )));
    }
    Ok(())
}

fn check_member(spec: &ParamSpec, value: &Value) -> DaoResult<()> {
    if value.is_null() && !spec.nullable {
        return Err(DaoError::invalid_parameter(
            spec.position,
            format!("member list for parameter {} cannot contain null", spec.position),
        ));
    }
    Ok(())
}

fn coerce(spec: &ParamSpec, value: Value) -> DaoResult<Value> {
    spec.sql_type
        .coerce(value)
        .map_err(|msg| DaoError::invalid_parameter(spec.position, msg))
}
