// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// From implementation for infra crates (to avoid circular dependency)
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Database(err)
    }
}

// Note: sqlx::Error conversion is handled in infra-sqlite
// by converting to AppError::Database(String)
