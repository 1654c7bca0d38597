//! Authorization Guard
//! Mission: Flat role checks plus the superadmin deletion invariant

use crate::auth::models::{AuthIdentity, Role};
use crate::errors::ApiError;

impl Role {
    /// Whether this role satisfies a requirement. `Superadmin` satisfies
    /// everything; `Admin` satisfies only `Admin`.
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::Admin => true,
            Role::Superadmin => *self == Role::Superadmin,
        }
    }
}

/// Reject identities whose role does not satisfy the requirement.
/// Identities without a role (chat principals) satisfy nothing.
pub fn require_role(identity: &AuthIdentity, required: Role) -> Result<(), ApiError> {
    match identity.role {
        Some(role) if role.satisfies(required) => Ok(()),
        _ => Err(ApiError::Forbidden("Insufficient permissions")),
    }
}
