// Error handling module for the pillar node
//
// Two layers of errors live here. `PillarError` covers infrastructure failures
// (archive, database, transfers, configuration). `RequestHandlerError` is the
// classification a request handler hands back to the failure boundary, which
// decides what response is sent and whether an alarm is raised.

use crate::types::{ResponseCode, ResponseInfo};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::io;
use std::result;
use thiserror::Error;

/// Result type for pillar infrastructure operations
pub type Result<T> = result::Result<T, PillarError>;

/// Result type for request handler steps
pub type HandlerResult<T> = result::Result<T, RequestHandlerError>;

/// Error type for pillar infrastructure operations
#[derive(Debug, Error, Clone)]
pub enum PillarError {
    /// Requested file does not exist in the archive
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// File already present where a new one was expected
    #[error("File already exists: {0}")]
    FileExists(String),

    /// Archive-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Checksum calculation errors
    #[error("Checksum error: {0}")]
    Checksum(String),

    /// Upload or download to a content address failed
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization-related errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Message bus errors
    #[error("Message bus error: {0}")]
    MessageBus(String),

    /// IO errors
    #[error("IO error: {0}")]
    IO(String),

    /// Anything else that went wrong inside the node
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for PillarError {
    fn into_response(self) -> Response {
        let status = match &self {
            PillarError::Serialization(_) => StatusCode::BAD_REQUEST,
            PillarError::FileNotFound(_) => StatusCode::NOT_FOUND,
            PillarError::Transfer(_) | PillarError::MessageBus(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

impl From<rusqlite::Error> for PillarError {
    fn from(err: rusqlite::Error) -> Self {
        PillarError::Database(err.to_string())
    }
}

impl From<io::Error> for PillarError {
    fn from(err: io::Error) -> Self {
        PillarError::IO(err.to_string())
    }
}

impl From<reqwest::Error> for PillarError {
    fn from(err: reqwest::Error) -> Self {
        PillarError::Transfer(err.to_string())
    }
}

impl From<url::ParseError> for PillarError {
    fn from(err: url::ParseError) -> Self {
        PillarError::Transfer(format!("Invalid address: {}", err))
    }
}

impl From<toml::ser::Error> for PillarError {
    fn from(err: toml::ser::Error) -> Self {
        PillarError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PillarError {
    fn from(err: toml::de::Error) -> Self {
        PillarError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PillarError {
    fn from(err: serde_json::Error) -> Self {
        PillarError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for PillarError {
    fn from(err: config::ConfigError) -> Self {
        PillarError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PillarError {
    fn from(err: tokio::task::JoinError) -> Self {
        PillarError::Internal(format!("Task failed: {}", err))
    }
}

/// Failure classification produced by request handlers.
///
/// The variant decides how the failure boundary reacts:
///
/// * `InvalidMessage` - a business failure (not found, duplicate, no space,
///   unsupported algorithm, transfer failure). Answered with the carried
///   response info, never alarmed.
/// * `IllegalOperation` - the request was understood but is not allowed to go
///   through (checksum mismatch, missing mandatory checksum). Answered with
///   the carried response info and alarmed unless the level is EMERGENCY.
/// * `IllegalArgument` - malformed input such as a wrong collection or pillar
///   id. Alarmed only at WARNING.
/// * `Internal` - an unexpected failure. Answered with OPERATION_FAILED and
///   alarmed unless the level is EMERGENCY.
#[derive(Debug, Error)]
pub enum RequestHandlerError {
    #[error("{}: {}", .info.response_code, .info.response_text)]
    InvalidMessage { info: ResponseInfo },

    #[error("{}: {}", .info.response_code, .info.response_text)]
    IllegalOperation {
        info: ResponseInfo,
        file_id: Option<String>,
    },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error(transparent)]
    Internal(#[from] PillarError),
}

impl RequestHandlerError {
    pub fn invalid_message(code: ResponseCode, text: impl Into<String>) -> Self {
        RequestHandlerError::InvalidMessage {
            info: ResponseInfo::new(code, text),
        }
    }

    pub fn illegal_operation(
        code: ResponseCode,
        text: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        RequestHandlerError::IllegalOperation {
            info: ResponseInfo::new(code, text),
            file_id: Some(file_id.into()),
        }
    }

    /// Converts a transfer failure into the business response the client
    /// expects, leaving every other infrastructure error as internal.
    pub fn from_transfer(err: PillarError) -> Self {
        match err {
            PillarError::Transfer(msg) => {
                Self::invalid_message(ResponseCode::FileTransferFailure, msg)
            }
            other => RequestHandlerError::Internal(other),
        }
    }
}
