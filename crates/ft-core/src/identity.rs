//! Account identities handed over by the external identity provider.
//!
//! Authentication itself happens elsewhere; the core only consumes an
//! already-authenticated user and the role recorded in their profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{UserId, ValidationError};

/// What an account is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Trainer,
    Client,
}

impl Role {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trainer => "trainer",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trainer" => Ok(Self::Trainer),
            "client" => Ok(Self::Client),
            _ => Err(ValidationError::UnknownVariant {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// A signed-up account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    /// Lower-cased sign-up email.
    pub email: String,
    pub role: Role,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Option<String>,
    pub role: Role,
}

/// Source of the authenticated caller.
pub trait Identity {
    /// Returns the signed-in user, if any.
    fn current_user(&self) -> Option<(UserId, Option<String>)>;

    /// Looks up the role recorded for a user.
    fn role(&self, user_id: UserId) -> Option<Role>;

    /// Resolves the signed-in user together with their role.
    fn whoami(&self) -> Option<CurrentUser> {
        let (id, email) = self.current_user()?;
        let role = self.role(id)?;
        Some(CurrentUser { id, email, role })
    }
}
