//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use borrowdesk_auth::{
    AuthzError, CommandAuthorization, DepartmentMembership, Principal, authorize, permissions_for_roles,
};

use crate::context::{DepartmentContext, PrincipalContext};

/// Resolve the request's principal within its active department.
pub fn resolve_principal(department: &DepartmentContext, principal: &PrincipalContext) -> Principal {
    let membership = DepartmentMembership {
        department_id: department.department_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_for_roles(principal.roles()),
    };

    Principal {
        principal_id: principal.principal_id(),
        active_department_id: department.department_id(),
        membership,
    }
}

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    department: &DepartmentContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve_principal(department, principal);

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use borrowdesk_auth::{Permission, PrincipalId, Role};
    use borrowdesk_core::DepartmentId;

    use super::*;

    struct Needs(Vec<Permission>);

    impl CommandAuthorization for Needs {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    fn contexts(roles: Vec<Role>) -> (DepartmentContext, PrincipalContext) {
        (
            DepartmentContext::new(DepartmentId::new()),
            PrincipalContext::new(PrincipalId::new(), roles),
        )
    }

    #[test]
    fn borrower_may_request_but_not_approve() {
        let (d, p) = contexts(vec![Role::BORROWER]);
        assert!(authorize_command(&d, &p, &Needs(vec![Permission::BORROWS_REQUEST])).is_ok());
        let err = authorize_command(&d, &p, &Needs(vec![Permission::BORROWS_APPROVE])).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("borrows.approve".to_string()));
    }

    #[test]
    fn admin_holds_every_permission() {
        let (d, p) = contexts(vec![Role::ADMIN]);
        let needs = Needs(vec![Permission::RETURNS_INSPECT, Permission::ITEMS_WRITE]);
        assert!(authorize_command(&d, &p, &needs).is_ok());
        assert!(resolve_principal(&d, &p).has(&Permission::BORROWS_READ_ALL));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let (d, p) = contexts(vec![Role::new("visitor")]);
        assert!(authorize_command(&d, &p, &Needs(vec![Permission::ITEMS_READ])).is_err());
    }
}
