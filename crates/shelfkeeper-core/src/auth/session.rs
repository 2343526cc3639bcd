use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{self, DecodeError, DecodedClaims};
use super::store::{Credentials, PersistedSession};

/// Permission tier shown in the interface.
///
/// Ordered by capability, so `role >= Role::Admin` reads as "at least admin".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Guest,
    User,
    Admin,
    Superuser,
}

impl Role {
    /// Highest matching tier; the superuser flag wins over staff.
    pub fn from_flags(is_staff: bool, is_superuser: bool) -> Self {
        if is_superuser {
            Role::Superuser
        } else if is_staff {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn from_claims(claims: Option<&DecodedClaims>) -> Self {
        claims
            .map(|c| Self::from_flags(c.is_staff, c.is_superuser))
            .unwrap_or(Role::Guest)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Guest => "Guest",
            Role::User => "User",
            Role::Admin => "Admin",
            Role::Superuser => "Superuser",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// Credentials together with the claims and role decoded from them.
///
/// Only constructible from credentials, so the claims can never drift from
/// the access token they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    credentials: Credentials,
    claims: DecodedClaims,
    role: Role,
}

impl Session {
    pub fn from_credentials(credentials: Credentials) -> Result<Self, DecodeError> {
        let claims = codec::decode(&credentials.access_token)?;
        let role = Role::from_claims(Some(&claims));
        Ok(Self {
            credentials,
            claims,
            role,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    pub fn claims(&self) -> &DecodedClaims {
        &self.claims
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_expired_at(&self, now_epoch_seconds: i64) -> bool {
        codec::is_expired(&self.claims, now_epoch_seconds)
    }

    pub(crate) fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            credentials: self.credentials.clone(),
            user_info: Some(self.claims.clone()),
        }
    }
}
