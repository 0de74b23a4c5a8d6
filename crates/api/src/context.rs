use rentworks_auth::Role;
use rentworks_core::UserId;

/// Caller context for a request (authenticated identity + roles).
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl CallerContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
