use borrowdesk_auth::{PrincipalId, Role};
use borrowdesk_core::{DepartmentId, UserId};

/// Department context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepartmentContext {
    department_id: DepartmentId,
}

impl DepartmentContext {
    pub fn new(department_id: DepartmentId) -> Self {
        Self { department_id }
    }

    pub fn department_id(&self) -> DepartmentId {
        self.department_id
    }
}

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// The principal as the acting user of lifecycle commands.
    pub fn user_id(&self) -> UserId {
        self.principal_id.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}
