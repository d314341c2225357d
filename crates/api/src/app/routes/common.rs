use borrowdesk_auth::{CommandAuthorization, Permission};

use crate::app::errors;
use crate::context::{DepartmentContext, PrincipalContext};

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }

    /// Authorize, then hand back the command for dispatch.
    pub fn authorize(
        self,
        department: &DepartmentContext,
        principal: &PrincipalContext,
    ) -> Result<C, axum::response::Response> {
        crate::authz::authorize_command(department, principal, &self)
            .map_err(errors::authz_error_to_response)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Read-side guard for routes without a command.
pub fn require(
    department: &DepartmentContext,
    principal: &PrincipalContext,
    permission: Permission,
) -> Result<(), axum::response::Response> {
    CmdAuth::new((), permission).authorize(department, principal)
}
