use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub iat: Option<u64>,
}

/// Roles the scheduling core distinguishes. Anything unrecognised is treated
/// as having no scheduling privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor,
    Organization,
    Admin,
    Unknown,
}

impl Role {
    pub fn from_claim(role: Option<&str>) -> Self {
        match role.map(|r| r.to_ascii_lowercase()).as_deref() {
            Some("patient") => Role::Patient,
            Some("doctor") => Role::Doctor,
            Some("organization") | Some("hospital") => Role::Organization,
            Some("admin") => Role::Admin,
            _ => Role::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_claim(self.role.as_deref())
    }

    /// Subject claim as a UUID, when it is one.
    pub fn uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}
