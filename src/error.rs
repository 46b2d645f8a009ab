//! Domain error types for the workflow monitor.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

/// Application-level errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// CI backend unreachable, malformed response or backend-reported failure
    #[error("Testing service error: {0}")]
    TestingService(String),

    /// Resource not found (locally or on the CI backend)
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    /// Whether this error comes from a CI backend rather than from the caller or the database.
    pub fn is_testing_service(&self) -> bool {
        matches!(self, AppError::TestingService(_))
    }

    /// Short detail string without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            AppError::Database(d)
            | AppError::TestingService(d)
            | AppError::NotFound(d)
            | AppError::InvalidInput(d)
            | AppError::Unauthorized(d) => d,
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::TestingService(err.to_string())
    }
}
