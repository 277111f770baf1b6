use std::sync::Arc;

use super::UserError;
use super::models::{ADMIN_ROLE, DEFAULT_ROLE, NewUser, User};
use super::password::hash_password;
use super::repository::UserRepository;

/// Creates application users with hashed passwords.
#[derive(Clone)]
pub struct UserManager {
    repo: Arc<dyn UserRepository>,
}

/// Optional attributes of a new user.
#[derive(Debug, Clone, Default)]
pub struct UserAttributes {
    pub role: Option<i32>,
    pub report_id: Option<i32>,
    pub organization_id: Option<i32>,
}

impl UserManager {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_user(
        &self,
        login: &str,
        password: &str,
        attributes: UserAttributes,
    ) -> Result<User, UserError> {
        let login = login.trim();
        if login.is_empty() {
            return Err(UserError::EmptyLogin);
        }

        let user = NewUser {
            login: login.to_string(),
            password_hash: hash_password(password)?,
            report_id: attributes.report_id,
            role: attributes.role.unwrap_or(DEFAULT_ROLE),
            organization_id: attributes.organization_id,
            is_staff: false,
            is_superuser: false,
        };
        let created = self.repo.insert_user(user).await?;
        log::info!(
            "Created user {} (id {}, {:?})",
            created.login,
            created.id,
            created.role()
        );
        Ok(created)
    }

    /// Administrator account: admin role, staff and superuser flags set.
    pub async fn create_superuser(&self, login: &str, password: &str) -> Result<User, UserError> {
        let login = login.trim();
        if login.is_empty() {
            return Err(UserError::EmptyLogin);
        }

        let user = NewUser {
            login: login.to_string(),
            password_hash: hash_password(password)?,
            report_id: None,
            role: ADMIN_ROLE,
            organization_id: None,
            is_staff: true,
            is_superuser: true,
        };
        let created = self.repo.insert_user(user).await?;
        log::info!("Created superuser {} (id {})", created.login, created.id);
        Ok(created)
    }
}
