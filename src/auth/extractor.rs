// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated principals.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn sign(Auth(user): Auth) -> impl IntoResponse {
//!     // user is UserInfo
//! }
//! ```
//!
//! ## Authentication Modes
//!
//! - **Production** (`AUTH_JWKS_URL` set): full signature verification
//!   against the issuer's JWKS, with issuer/audience validation.
//! - **Development** (no JWKS configured): a provided bearer token is decoded
//!   without signature verification so claims still shape permissions; with
//!   no token at all the request runs as the anonymous `*:*` principal.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use super::authorizator::UserInfo;
use super::claims::JwtClaims;
use super::error::AuthError;
use crate::state::AppState;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor yielding the authenticated [`UserInfo`].
pub struct Auth(pub UserInfo);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A middleware (or the WS handshake) may have resolved the user already.
        if let Some(user) = parts.extensions.get::<UserInfo>().cloned() {
            return Ok(Auth(user));
        }

        let user = authenticate(parts.headers.get(AUTHORIZATION), state).await?;
        Ok(Auth(user))
    }
}

/// Resolve a principal from an optional `Authorization` header value.
///
/// Shared by the extractor and the WebSocket upgrade path, which must
/// authenticate before the protocol switch.
pub async fn authenticate(
    header: Option<&axum::http::HeaderValue>,
    state: &AppState,
) -> Result<UserInfo, AuthError> {
    let header = match header {
        Some(value) => value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?,
        None => {
            if state.auth.jwks.is_none() {
                return Ok(UserInfo::anonymous());
            }
            return Err(AuthError::MissingAuthHeader);
        }
    };

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();

    let claims = match &state.auth.jwks {
        Some(jwks) => verify_token(token, jwks, state).await?,
        None => decode_unverified(token)?,
    };

    Ok(claims.into_user_info(|role| state.registry.role_permissions(role)))
}

/// Production verification against the configured JWKS.
async fn verify_token(
    token: &str,
    jwks: &super::jwks::JwksManager,
    state: &AppState,
) -> Result<JwtClaims, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
    let (decoding_key, algorithm) = jwks.decoding_key(header.kid.as_deref()).await?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;

    if let Some(issuer) = &state.auth.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &state.auth.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        }
    })?;

    Ok(data.claims)
}

/// Development-mode decode: claims are honored, signature is not checked.
fn decode_unverified(token: &str) -> Result<JwtClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<JwtClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| AuthError::MalformedToken)?;
    Ok(data.claims)
}
