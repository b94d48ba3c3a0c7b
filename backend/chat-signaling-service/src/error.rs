use crate::middleware::error_handling;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Why a credential was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid Authorization header format")]
    MalformedHeader,

    #[error("{0}")]
    InvalidToken(String),
}

/// Why an authenticated caller may not touch a resource
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("messaging requires a mutual connection or an accepted mentorship")]
    MessagingNotAllowed,

    #[error("only the sender can delete a message")]
    NotSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Conversation,
    Message,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Conversation => "conversation",
            Entity::Message => "message",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    #[error("not allowed: {0}")]
    Authorization(Denial),

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<crypto_core::JwtError> for AppError {
    fn from(e: crypto_core::JwtError) -> Self {
        AppError::Authentication(AuthFailure::InvalidToken(e.to_string()))
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Authentication(_) => 401,
            AppError::Authorization(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Internal => 500,
        }
    }
}
