// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Error Handling
//!
//! This module defines the domain error taxonomy shared by every component,
//! plus the `ApiError` adapter that converts taxonomy errors into HTTP
//! responses.
//!
//! Two mappings hang off the taxonomy:
//!
//! - REST: each variant owns an HTTP status code (`StoreError::status`).
//! - JSON-RPC: each variant owns an application error code in the
//!   -32000..-32099 range (`StoreError::rpc_code`), with `InvalidParameter`
//!   and `InvalidFormat` on the standard -32602/-32600 codes.
//!
//! ## JSON Response Format
//!
//! REST errors are returned as JSON with a single `error` field:
//!
//! ```json
//! { "error": "account not found" }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Result alias used across the store, connector and node layers.
pub type StoreResult<T> = Result<T, StoreError>;

/// Domain error taxonomy.
///
/// `Forbidden` is terminal (never retried). `NotSupported` from a backend is
/// swallowed by the Ethereum connector for restore/destroy only. `Internal`
/// is reserved for invariant violations and must never surface for a
/// foreseeable user error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// HTTP status for the REST surface.
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::InvalidParameter(_) | StoreError::InvalidFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::NotSupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::DependencyFailure(_) => StatusCode::FAILED_DEPENDENCY,
            StoreError::Config(_) | StoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON-RPC error code for the node proxy surface.
    ///
    /// NotFound and Forbidden share -32000: the wire protocol pins both
    /// "account not found" and "forbidden" to that code, distinguished by
    /// message.
    pub fn rpc_code(&self) -> i64 {
        match self {
            StoreError::InvalidParameter(_) => -32602,
            StoreError::InvalidFormat(_) => -32600,
            StoreError::NotFound(_) | StoreError::Forbidden(_) => -32000,
            StoreError::Unauthorized(_) => -32001,
            StoreError::AlreadyExists(_) => -32002,
            StoreError::NotSupported(_) => -32004,
            StoreError::Config(_) => -32005,
            StoreError::DependencyFailure(_) => -32010,
            StoreError::Internal(_) => -32603,
        }
    }
}

/// API error with HTTP status and message.
///
/// This type implements `IntoResponse`, allowing it to be returned directly
/// from Axum handlers. The error is serialized as JSON.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code for the response.
    pub status: StatusCode,
    /// Human-readable error message (included in JSON response).
    pub message: String,
}

/// JSON body structure for error responses.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    /// Create a new API error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 403 Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Create a 500 Internal Server Error.
    ///
    /// Use for unexpected server-side failures. Avoid exposing internal details.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::new(err.status(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(
            StoreError::InvalidParameter("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            StoreError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            StoreError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::AlreadyExists("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StoreError::NotSupported("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            StoreError::DependencyFailure("x".into()).status(),
            StatusCode::FAILED_DEPENDENCY
        );
        assert_eq!(
            StoreError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn taxonomy_maps_to_rpc_codes() {
        assert_eq!(StoreError::InvalidParameter("x".into()).rpc_code(), -32602);
        assert_eq!(StoreError::NotFound("x".into()).rpc_code(), -32000);
        assert_eq!(StoreError::Forbidden("x".into()).rpc_code(), -32000);
        assert_eq!(StoreError::Unauthorized("x".into()).rpc_code(), -32001);
        assert_eq!(StoreError::Internal("x".into()).rpc_code(), -32603);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
