//! Caller identity
//!
//! A `UserContext` is the immutable record extracted from an authenticated
//! session: the role name as it appears in the token plus the numeric user
//! id. Role names are parsed into the closed `Role` set at the
//! authorization boundary so that unknown names can be rejected rather
//! than silently treated as unprivileged.

use std::fmt;

/// Roles recognized by the authorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sees public tables plus rows pinned to the student's own id
    Student,
    /// Sees public tables plus rows pinned to the professor's own id
    Professor,
    /// Unrestricted read access
    Admin,
}

impl Role {
    /// Parse a role name as carried in session claims
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "student" => Some(Role::Student),
            "professor" => Some(Role::Professor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Canonical role name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    /// Role name from the session claims, not yet validated
    pub role: String,
    /// Numeric user id
    pub id: i64,
}

impl UserContext {
    /// Create a new user context
    pub fn new(role: impl Into<String>, id: i64) -> Self {
        UserContext {
            role: role.into(),
            id,
        }
    }
}
