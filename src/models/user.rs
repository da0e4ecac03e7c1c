use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    Manager,
    Finance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "EMPLOYEE",
            Role::Manager => "MANAGER",
            Role::Finance => "FINANCE",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EMPLOYEE" => Ok(Role::Employee),
            "MANAGER" => Ok(Role::Manager),
            "FINANCE" => Ok(Role::Finance),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// An authenticated actor. Every workflow operation receives one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub reports_to: Option<Uuid>,
}

impl Principal {
    pub fn is(&self, id: Option<Uuid>) -> bool {
        id == Some(self.id)
    }
}

// Raw `users` row. `role` stays a string so an unrecognised value can be
// rejected at the directory boundary instead of failing the whole query.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub reports_to: Option<Uuid>,
    pub is_active: bool,
}

impl UserRow {
    pub fn into_principal(self) -> Option<Principal> {
        if !self.is_active {
            return None;
        }
        match self.role.parse::<Role>() {
            Ok(role) => Some(Principal {
                id: self.id,
                username: self.username,
                role,
                reports_to: self.reports_to,
            }),
            Err(e) => {
                log::warn!("Refusing principal {}: {}", self.id, e);
                None
            }
        }
    }
}

/// Login material for a single user.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub principal: Principal,
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub reports_to: Option<Uuid>,
}

impl From<Principal> for MeResponse {
    fn from(principal: Principal) -> Self {
        Self {
            id: principal.id,
            username: principal.username,
            role: principal.role,
            reports_to: principal.reports_to,
        }
    }
}
