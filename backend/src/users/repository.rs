use async_trait::async_trait;
use sqlx::PgPool;

use super::models::{NewUser, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Login already exists: {0}")]
    LoginTaken(String),
}

/// Access to the externally owned `users` table.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Role of the user with `id`, or `None` when no such user exists.
    async fn get_user_role(&self, id: i32) -> Result<Option<Role>, RepositoryError>;

    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user_role(&self, id: i32) -> Result<Option<Role>, RepositoryError> {
        let role: Option<i32> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.map(Role::from))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let login = user.login.clone();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users
                (login, password, report_id, role, organization_id,
                 is_active, is_staff, is_superuser, date_joined)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, now())
            RETURNING id, login, password, report_id, role, organization_id,
                      is_active, is_staff, date_joined
            "#,
        )
        .bind(user.login)
        .bind(user.password_hash)
        .bind(user.report_id)
        .bind(user.role)
        .bind(user.organization_id)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::LoginTaken(login)
            }
            other => RepositoryError::Database(other),
        })
    }
}
