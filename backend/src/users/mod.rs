pub mod manager;
pub mod models;
pub mod password;
pub mod repository;

use repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("The login field is required")]
    EmptyLogin,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
