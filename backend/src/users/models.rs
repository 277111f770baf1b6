use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value of `users.role` that grants administrative access.
pub const ADMIN_ROLE: i32 = 1;
pub const DEFAULT_ROLE: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member(i32),
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl From<i32> for Role {
    fn from(value: i32) -> Self {
        if value == ADMIN_ROLE {
            Role::Admin
        } else {
            Role::Member(value)
        }
    }
}

/// Row of the application's `users` table. `password` holds a PHC hash string.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub login: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub report_id: Option<i32>,
    pub role: i32,
    pub organization_id: Option<i32>,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from(self.role)
    }
}

/// A user that has been validated and hashed but not yet stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub report_id: Option<i32>,
    pub role: i32,
    pub organization_id: Option<i32>,
    pub is_staff: bool,
    pub is_superuser: bool,
}
