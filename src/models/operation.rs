//! Declarative operation metadata.
//!
//! A DAO type declares an ordered list of operations. Each operation carries its
//! descriptor, the query template with its parameter specs, and (for reads) the
//! result spec describing how rows become values. Everything here is constructed
//! once when a DAO type is registered and is read-only afterwards.

use crate::error::{DaoError, DaoResult};
use crate::models::record::ResultType;
use crate::models::value::SqlType;
use serde::{Deserialize, Serialize};

/// Reserved marker token that expands into the membership placeholder group.
pub const MEMBERSHIP_MARKER: &str = "?..?";

/// Kind of logical operation, used for diagnostics and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    ReadAll,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read | Self::ReadAll => "data retrieve",
            Self::Create => "data insert",
            Self::Update => "data update",
            Self::Delete => "data delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position and identity of an operation within a DAO type's metadata list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Zero-based slot this descriptor claims to occupy.
    pub index: usize,
    pub name: String,
    /// Formal parameter types of the DAO method.
    #[serde(default)]
    pub param_arity: Vec<SqlType>,
}

impl OperationDescriptor {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            param_arity: Vec::new(),
        }
    }

    pub fn with_params(mut self, param_arity: impl Into<Vec<SqlType>>) -> Self {
        self.param_arity = param_arity.into();
        self
    }
}

/// Declared type and nullability of one positional query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// 1-based position before membership expansion.
    pub position: usize,
    pub sql_type: SqlType,
    #[serde(default)]
    pub nullable: bool,
}

impl ParamSpec {
    pub fn new(position: usize, sql_type: SqlType) -> Self {
        Self {
            position,
            sql_type,
            nullable: false,
        }
    }

    pub fn nullable(position: usize, sql_type: SqlType) -> Self {
        Self {
            position,
            sql_type,
            nullable: true,
        }
    }
}

/// Query template plus its parameter declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub template: String,
    #[serde(default)]
    pub has_membership_clause: bool,
    #[serde(default)]
    pub param_specs: Vec<ParamSpec>,
}

impl QuerySpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            has_membership_clause: false,
            param_specs: Vec::new(),
        }
    }

    /// Declare the next positional parameter; positions are assigned in call order.
    pub fn param(mut self, sql_type: SqlType) -> Self {
        let position = self.param_specs.len() + 1;
        self.param_specs.push(ParamSpec::new(position, sql_type));
        self
    }

    /// Declare the next positional parameter as nullable.
    pub fn nullable_param(mut self, sql_type: SqlType) -> Self {
        let position = self.param_specs.len() + 1;
        self.param_specs.push(ParamSpec::nullable(position, sql_type));
        self
    }

    /// Declare explicit parameter specs, positions included.
    pub fn with_param_specs(mut self, specs: impl Into<Vec<ParamSpec>>) -> Self {
        self.param_specs = specs.into();
        self
    }

    /// Mark the template as containing the membership marker.
    pub fn with_membership_clause(mut self) -> Self {
        self.has_membership_clause = true;
        self
    }

    /// Check the template against the membership declaration.
    pub fn validate(&self) -> DaoResult<()> {
        let markers = self.template.matches(MEMBERSHIP_MARKER).count();
        if self.has_membership_clause && markers != 1 {
            return Err(DaoError::configuration(format!(
                "query declares a membership clause but its template contains {} '{}' markers: {}",
                markers, MEMBERSHIP_MARKER, self.template
            )));
        }
        if !self.has_membership_clause && markers > 0 {
            return Err(DaoError::configuration(format!(
                "query template contains '{}' but does not declare a membership clause: {}",
                MEMBERSHIP_MARKER, self.template
            )));
        }
        Ok(())
    }
}

/// One result column and the record field it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column_name: String,
    /// Ignored when the result is not encapsulated.
    #[serde(default)]
    pub field_name: String,
    /// Read the column as this type; `None` uses the backend's default mapping.
    #[serde(default)]
    pub value_type: Option<SqlType>,
}

impl ColumnSpec {
    /// Map a column onto the field of the same name.
    pub fn new(column_name: impl Into<String>) -> Self {
        let column_name = column_name.into();
        Self {
            field_name: column_name.clone(),
            column_name,
            value_type: None,
        }
    }

    pub fn to_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn typed(mut self, value_type: SqlType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

/// How rows are turned into values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSpec {
    pub encapsulate: bool,
    pub columns: Vec<ColumnSpec>,
}

impl ResultSpec {
    /// Assemble the listed columns into one record per row.
    pub fn record(columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        Self {
            encapsulate: true,
            columns: columns.into_iter().collect(),
        }
    }

    /// Return the single column of each row as a raw value.
    pub fn scalar(column: ColumnSpec) -> Self {
        Self {
            encapsulate: false,
            columns: vec![column],
        }
    }

    pub fn validate(&self) -> DaoResult<()> {
        if !self.encapsulate && self.columns.len() != 1 {
            return Err(DaoError::configuration(format!(
                "a non-encapsulated result expects exactly one column, {} declared",
                self.columns.len()
            )));
        }
        if self.encapsulate && self.columns.is_empty() {
            return Err(DaoError::configuration(
                "an encapsulated result must declare at least one column",
            ));
        }
        Ok(())
    }
}

/// Full metadata of one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub descriptor: OperationDescriptor,
    pub query: QuerySpec,
    pub result: Option<ResultSpec>,
    /// Result type checked at registration, if one was declared.
    pub result_type: Option<&'static str>,
}

impl Operation {
    /// A write operation (or a read whose result spec is attached later).
    pub fn new(descriptor: OperationDescriptor, query: QuerySpec) -> Self {
        Self {
            descriptor,
            query,
            result: None,
            result_type: None,
        }
    }

    /// Attach a result spec without naming the Rust type it maps into.
    pub fn with_result(mut self, result: ResultSpec) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach a result spec and check it against `T`'s field table right away.
    pub fn returning<T: ResultType>(mut self, result: ResultSpec) -> DaoResult<Self> {
        crate::db::mapper::check_result_type::<T>(&result)?;
        self.result = Some(result);
        self.result_type = Some(std::any::type_name::<T>());
        Ok(self)
    }

    /// Consistency checks that do not depend on the slot this operation occupies.
    pub fn validate(&self) -> DaoResult<()> {
        self.query.validate()?;
        let arity = self.descriptor.param_arity.len();
        if arity != 0 && arity != self.query.param_specs.len() {
            return Err(DaoError::configuration(format!(
                "operation takes {} parameters but its query declares {}",
                arity,
                self.query.param_specs.len()
            )));
        }
        if let Some(result) = &self.result {
            result.validate()?;
        }
        Ok(())
    }
}
