//! Authorization and identity error taxonomy

use crate::engine::database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Login failure. Never says whether the name or the password was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Name already taken: {0}")]
    DuplicateName(String),

    /// Missing, unknown or expired token.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Insufficient rights")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AuthError {
    fn from(err: rusqlite::Error) -> Self {
        AuthError::Store(DatabaseError::SqliteError(err))
    }
}

impl From<r2d2::Error> for AuthError {
    fn from(err: r2d2::Error) -> Self {
        AuthError::Store(DatabaseError::PoolError(err))
    }
}

impl AuthError {
    /// Stable machine-readable kind used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::DuplicateName(_) => "duplicate_name",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Forbidden => "forbidden",
            AuthError::NotFound(_) => "not_found",
            AuthError::Validation(_) => "validation",
            AuthError::Store(_) | AuthError::Internal(_) => "internal",
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
