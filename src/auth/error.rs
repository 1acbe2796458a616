// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors produced while authenticating a request.
///
/// All variants map to `401 Unauthorized` except JWKS infrastructure
/// failures, which map to `503` so callers can tell an outage apart from a
/// bad token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingAuthHeader,

    #[error("malformed Authorization header")]
    InvalidAuthHeader,

    #[error("malformed token")]
    MalformedToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid token issuer")]
    InvalidIssuer,

    #[error("invalid token audience")]
    InvalidAudience,

    #[error("token not yet valid")]
    TokenNotYetValid,

    #[error("no matching JWKS key")]
    NoMatchingKey,

    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::JwksFetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_are_unauthorized() {
        assert_eq!(AuthError::MissingAuthHeader.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::NoMatchingKey.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn jwks_outage_is_service_unavailable() {
        assert_eq!(
            AuthError::JwksFetch("timeout".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
