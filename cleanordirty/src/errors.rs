use crate::db::errors::DbError;
use crate::minter::MintError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed request body or a field that fails validation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with code {code} not found")]
    NotFound { resource: String, code: String },

    /// The code minting service failed or could not be reached
    #[error("{service} request failed: {source}")]
    ExternalService {
        service: String,
        #[source]
        source: MintError,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(code: impl Into<String>) -> Self {
        Error::NotFound {
            resource: "dishwasher".to_string(),
            code: code.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::ExternalService { .. } => "error creating dishwasher: could not mint a code".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "dishwasher not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some("dishwashers_code_unique") => "error creating dishwasher: code is already in use".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::CheckViolation { constraint, .. } => match constraint.as_deref() {
                    Some("dishwashers_last_updated_non_negative") => "last_updated must not be negative".to_string(),
                    _ => "Invalid data provided".to_string(),
                },
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details - level depends on who is at fault
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ExternalService { .. } => {
                tracing::warn!("Upstream service error: {:#}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Database(DbError::NotFound) => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
        }

        // Error bodies are a bare JSON string
        (self.status_code(), Json(self.user_message())).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
