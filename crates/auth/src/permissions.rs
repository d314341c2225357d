use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "borrows.approve"). The wildcard
/// `"*"` grants everything within the active department.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ITEMS_READ: Permission = Permission(Cow::Borrowed("items.read"));
    pub const ITEMS_WRITE: Permission = Permission(Cow::Borrowed("items.write"));

    pub const BORROWS_REQUEST: Permission = Permission(Cow::Borrowed("borrows.request"));
    /// Read one's own borrow transactions.
    pub const BORROWS_READ: Permission = Permission(Cow::Borrowed("borrows.read"));
    /// Read every borrow transaction in the department.
    pub const BORROWS_READ_ALL: Permission = Permission(Cow::Borrowed("borrows.read_all"));
    pub const BORROWS_APPROVE: Permission = Permission(Cow::Borrowed("borrows.approve"));
    pub const BORROWS_RETURN: Permission = Permission(Cow::Borrowed("borrows.return"));
    pub const RETURNS_VERIFY: Permission = Permission(Cow::Borrowed("returns.verify"));
    pub const RETURNS_INSPECT: Permission = Permission(Cow::Borrowed("returns.inspect"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
