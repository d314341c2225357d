use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; [`permissions_for_roles`] is the policy that
/// maps them onto permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const BORROWER: Role = Role(Cow::Borrowed("borrower"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str() == "admin"
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy.
///
/// `admin` grants everything in the department. `borrower` (students and
/// employees) may browse items, request borrows, read their own transactions
/// and hand items back. Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::WILDCARD];
    }

    let mut perms = Vec::new();
    if roles.iter().any(|r| r.as_str() == "borrower") {
        perms.extend([
            Permission::ITEMS_READ,
            Permission::BORROWS_REQUEST,
            Permission::BORROWS_READ,
            Permission::BORROWS_RETURN,
        ]);
    }
    perms
}
