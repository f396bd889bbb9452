//! Operation registry.
//!
//! Each DAO type registers its ordered operation list once; calls then resolve an
//! operation by `(type, index)`.

use crate::error::{DaoError, DaoResult};
use crate::models::Operation;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct Registration {
    type_name: &'static str,
    operations: Vec<Arc<Operation>>,
}

/// Registered operation metadata keyed by DAO type.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    entries: RwLock<HashMap<TypeId, Registration>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the operation list of DAO type `D`, replacing any earlier one.
    ///
    /// Every operation is checked on its own here; slot/index agreement is
    /// checked on each lookup.
    pub fn register<D: 'static>(&self, operations: Vec<Operation>) -> DaoResult<()> {
        let type_name = std::any::type_name::<D>();
        for op in &operations {
            op.validate().map_err(|e| match e {
                DaoError::Configuration { message } => DaoError::configuration(format!(
                    "{} operation {} ('{}'): {}",
                    type_name, op.descriptor.index, op.descriptor.name, message
                )),
                other => other,
            })?;
        }

        debug!(dao = type_name, operations = operations.len(), "Registered DAO type");
        self.entries.write().insert(
            TypeId::of::<D>(),
            Registration {
                type_name,
                operations: operations.into_iter().map(Arc::new).collect(),
            },
        );
        Ok(())
    }

    pub fn is_registered<D: 'static>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<D>())
    }

    /// Look up operation `index` of DAO type `D`.
    pub fn resolve<D: 'static>(&self, index: usize) -> DaoResult<Arc<Operation>> {
        let entries = self.entries.read();
        let type_name = std::any::type_name::<D>();
        let registration = entries.get(&TypeId::of::<D>()).ok_or_else(|| {
            DaoError::configuration(format!("{} declares no operation metadata", type_name))
        })?;

        if registration.operations.is_empty() {
            return Err(DaoError::configuration(format!(
                "{} declares no operation metadata",
                registration.type_name
            )));
        }

        let op = registration.operations.get(index).ok_or_else(|| {
            DaoError::configuration(format!(
                "operation index {} is out of range for {} ({} declared)",
                index,
                registration.type_name,
                registration.operations.len()
            ))
        })?;

        if op.descriptor.index != index {
            return Err(DaoError::configuration(format!(
                "{}: operation at slot {} declares index {}",
                registration.type_name, index, op.descriptor.index
            )));
        }

        Ok(Arc::clone(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationDescriptor, QuerySpec, SqlType};

    struct PersonDao;
    struct EmptyDao;
    struct UnknownDao;

    fn op(index: usize, name: &str) -> Operation {
        Operation::new(
            OperationDescriptor::new(index, name),
            QuerySpec::new("SELECT * FROM person_info WHERE id = ?").param(SqlType::Integer),
        )
    }

    #[test]
    fn test_resolve_valid_indices() {
        let registry = OperationRegistry::new();
        registry
            .register::<PersonDao>(vec![op(0, "all"), op(1, "by_id")])
            .unwrap();
        for i in 0..2 {
            assert_eq!(registry.resolve::<PersonDao>(i).unwrap().descriptor.index, i);
        }
    }

    #[test]
    fn test_out_of_range_and_unknown() {
        let registry = OperationRegistry::new();
        registry.register::<PersonDao>(vec![op(0, "all")]).unwrap();
        registry.register::<EmptyDao>(vec![]).unwrap();

        for err in [
            registry.resolve::<PersonDao>(1).unwrap_err(),
            registry.resolve::<EmptyDao>(0).unwrap_err(),
            registry.resolve::<UnknownDao>(0).unwrap_err(),
        ] {
            assert!(matches!(err, DaoError::Configuration { .. }));
        }
    }

    #[test]
    fn test_index_mismatch() {
        let registry = OperationRegistry::new();
        registry
            .register::<PersonDao>(vec![op(0, "a"), op(0, "b")])
            .unwrap();
        assert!(registry.resolve::<PersonDao>(0).is_ok());
        assert!(matches!(
            registry.resolve::<PersonDao>(1),
            Err(DaoError::Configuration { .. })
        ));
    }

    #[test]
    fn test_register_rejects_bad_template() {
        let registry = OperationRegistry::new();
        let bad = Operation::new(
            OperationDescriptor::new(0, "ids"),
            QuerySpec::new("SELECT id FROM t WHERE id IN (?)").with_membership_clause(),
        );
        assert!(registry.register::<PersonDao>(vec![bad]).is_err());
        assert!(!registry.is_registered::<PersonDao>());
    }
}
