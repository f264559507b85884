//! Authoritative role resolution.
//!
//! `AuthoritativeRole` can only be built from a profile row read from the
//! profile store while handling the current request. Guards take this type,
//! so a cached or client-supplied role can never gate access.

use uuid::Uuid;

use crate::{models::UserRole, store::ProfileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritativeRole(UserRole);

impl AuthoritativeRole {
    pub fn role(self) -> UserRole {
        self.0
    }

    pub fn is(self, role: UserRole) -> bool {
        self.0 == role
    }

    /// Only for code paths that have just read the profile row themselves.
    pub(crate) fn from_fresh_read(role: UserRole) -> Self {
        Self(role)
    }

    #[cfg(test)]
    pub fn for_tests(role: UserRole) -> Self {
        Self(role)
    }
}

/// What the route guard knows about the caller of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    /// A live session whose profile could not be read or carries no role.
    Unresolvable,
    Authenticated(AuthoritativeRole),
}

/// Reads the role straight from the profile store. `None` covers lookup
/// failures, missing rows and rows without a role.
pub async fn resolve_role(profiles: &dyn ProfileStore, user_id: Uuid) -> Option<AuthoritativeRole> {
    match profiles.get(user_id).await {
        Ok(Some(profile)) => {
            if profile.role.is_none() {
                tracing::warn!(%user_id, "Profile has no role");
            }
            profile.role.map(AuthoritativeRole::from_fresh_read)
        }
        Ok(None) => {
            tracing::warn!(%user_id, "No profile row for authenticated user");
            None
        }
        Err(err) => {
            tracing::error!(%user_id, error = %err, "Role lookup failed");
            None
        }
    }
}
