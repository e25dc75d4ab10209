use serde::{Deserialize, Serialize};

/// Platform-wide roles as stored by the user service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Moderator,
    Member,
}

impl UserRole {
    /// Staff roles skip some client-side throttles elsewhere in the
    /// platform; the relay only caches the role to avoid repeat lookups.
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Moderator)
    }
}

/// Profile data returned by the user directory collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub role: UserRole,
}

impl UserProfile {
    pub fn new(id: String, display_name: String) -> Self {
        Self {
            id,
            display_name,
            role: UserRole::Member,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_roles() {
        assert!(UserRole::Admin.is_staff());
        assert!(UserRole::Moderator.is_staff());
        assert!(!UserRole::Member.is_staff());
    }
}
