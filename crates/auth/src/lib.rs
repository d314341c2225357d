//! `borrowdesk-auth`: pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer decodes a bearer token with
//! a [`JwtValidator`], resolves a [`Principal`] and calls [`authorize`].

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::{DepartmentMembership, PrincipalId};
pub use roles::{Role, permissions_for_roles};
