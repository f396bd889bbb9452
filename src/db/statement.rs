//! Statement text construction.
//!
//! A query template is used verbatim unless it declares a membership clause. In that
//! case its single `?..?` marker is replaced by one placeholder per supplied member.

use crate::error::{DaoError, DaoResult};
use crate::models::{MEMBERSHIP_MARKER, MembershipValues, QueryParam, QuerySpec};

/// Build the executable query text for one call.
pub fn build(query: &QuerySpec, params: &[QueryParam]) -> DaoResult<String> {
    if !query.has_membership_clause {
        return Ok(query.template.clone());
    }

    let members = single_membership(params)?.ok_or_else(|| {
        DaoError::configuration(format!(
            "query declares a membership clause but no member list was supplied: {}",
            query.template
        ))
    })?;

    let markers = query.template.matches(MEMBERSHIP_MARKER).count();
    if markers != 1 {
        return Err(DaoError::configuration(format!(
            "expected exactly one '{}' marker, found {}: {}",
            MEMBERSHIP_MARKER, markers, query.template
        )));
    }

    Ok(query
        .template
        .replacen(MEMBERSHIP_MARKER, &placeholder_group(members.count()), 1))
}

/// Comma-joined placeholders; always at least one.
pub fn placeholder_group(count: usize) -> String {
    vec!["?"; count.max(1)].join(", ")
}

/// Find the one membership argument among the parameters.
///
/// More than one is a configuration defect: only one clause per query is supported.
pub(crate) fn single_membership(params: &[QueryParam]) -> DaoResult<Option<&MembershipValues>> {
    let mut found = None;
    for (i, param) in params.iter().enumerate() {
        if let QueryParam::Members(members) = param {
            if found.is_some() {
                return Err(DaoError::configuration(format!(
                    "more than one member list supplied (second at parameter {}); \
                     only one membership clause per query is supported",
                    i + 1
                )));
            }
            found = Some(members);
        }
    }
    Ok(found)
}
