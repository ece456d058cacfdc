//! Centralized error types for the Chorus core library.
//!
//! Structured error types using `thiserror`, mapped to HTTP status codes
//! and machine-readable codes for the JSON API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::engine::DeviceError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DeviceError {
    fn code(&self) -> &'static str {
        match self {
            DeviceError::UnknownTrack(_) => "unknown_track",
            DeviceError::StartRefused(_) => "playback_start_refused",
        }
    }
}

/// Application-wide error type for the Chorus server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ChorusError {
    /// Requested group id has no live coordinator.
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Media library access failed.
    #[error("Library error: {0}")]
    Library(String),
}

impl ChorusError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GroupNotFound(_) => "group_not_found",
            Self::Library(_) => "library_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::GroupNotFound(_) => StatusCode::NOT_FOUND,
            Self::Library(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode for ChorusError {
    fn code(&self) -> &'static str {
        ChorusError::code(self)
    }
}

impl From<std::io::Error> for ChorusError {
    fn from(err: std::io::Error) -> Self {
        Self::Library(err.to_string())
    }
}

/// Convenient Result alias for application-wide operations.
pub type ChorusResult<T> = Result<T, ChorusError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ChorusError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_not_found_maps_to_404() {
        let err = ChorusError::GroupNotFound("g1".into());
        assert_eq!(err.code(), "group_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn io_error_converts_to_library_error() {
        let err: ChorusError = std::io::Error::other("disk gone").into();
        assert_eq!(err.code(), "library_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
