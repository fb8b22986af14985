/// Role-based authorization gate
///
/// Each protected resource builds its own gate with the exact roles it
/// accepts. There is no hierarchy: `admin` passes only where it is listed.

use std::collections::HashSet;

use crate::error::AuthError;
use crate::principals::{Principal, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    allowed: HashSet<Role>,
}

impl RoleGate {
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    /// true iff the principal's role is in the allowed set
    pub fn check(&self, principal: &Principal) -> bool {
        self.allows(principal.role)
    }

    /// `check`, as a result the caller can `?`
    pub fn require(&self, principal: &Principal) -> Result<(), AuthError> {
        if self.check(principal) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %principal.id,
                role = %principal.role,
                "Role not permitted for this resource"
            );
            Err(AuthError::InsufficientPermission)
        }
    }
}
