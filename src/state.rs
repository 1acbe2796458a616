// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application State
//!
//! Shared state passed to every Axum handler via the `State` extractor: the
//! manifest-built registry and the authentication settings.
//!
//! ## Authentication Modes
//!
//! - **Production**: `AUTH_JWKS_URL` set → JWT signatures verified via JWKS
//! - **Development**: no JWKS configured → tokens decoded unverified, absent
//!   tokens run as the anonymous `*:*` principal

use std::sync::Arc;

use crate::auth::JwksManager;
use crate::registry::Registry;

/// Authentication configuration for JWT verification.
#[derive(Clone, Default)]
pub struct AuthSettings {
    /// JWKS manager for fetching the issuer's public keys.
    ///
    /// `Some` enables production verification; `None` is development mode.
    pub jwks: Option<Arc<JwksManager>>,
    /// Expected `iss` claim (the OIDC issuer).
    pub issuer: Option<String>,
    /// Expected `aud` claim, when enforced.
    pub audience: Option<String>,
}

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Manifest-built object graph: stores, nodes, roles.
    pub registry: Arc<Registry>,
    /// JWT verification settings.
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            auth: AuthSettings::default(),
        }
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }
}
