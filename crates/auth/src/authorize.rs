use std::collections::HashSet;

use thiserror::Error;

use borrowdesk_core::DepartmentId;

use crate::{DepartmentMembership, Permission, PrincipalId};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_department_id: DepartmentId,
    pub membership: DepartmentMembership,
}

impl Principal {
    /// Whether the principal holds `permission` (directly or via wildcard).
    pub fn has(&self, permission: &Permission) -> bool {
        authorize(self, permission).is_ok()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("department mismatch")]
    DepartmentMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract, checked before dispatch.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active department.
///
/// No IO, no panics, no business rules.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_department_id != principal.membership.department_id {
        return Err(AuthzError::DepartmentMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
