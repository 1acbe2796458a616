// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and their conversion into a [`UserInfo`] principal.

use serde::Deserialize;
use tracing::warn;

use super::authorizator::UserInfo;
use super::permissions::Permission;

/// Claims decoded from a bearer token.
///
/// Beyond the standard OIDC claims, the key manager reads two custom claims:
/// `permissions` (a list of `action:resource` strings) and `roles` (role
/// names resolved against `Role` manifests at request time).
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    /// Subject — the canonical principal name.
    pub sub: String,

    /// Expiration timestamp (validated by the jsonwebtoken crate).
    #[serde(default)]
    #[allow(dead_code)]
    pub exp: i64,

    /// Issuer (validated by the jsonwebtoken crate when configured).
    #[serde(default)]
    #[allow(dead_code)]
    pub iss: String,

    /// Audience (validated by the jsonwebtoken crate, not read directly).
    #[serde(default)]
    #[allow(dead_code)]
    pub aud: Option<serde_json::Value>,

    /// Direct permission grants in `action:resource` form.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Role names; expanded through the registry's role manifests.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl JwtClaims {
    /// Build the principal, expanding role names through `role_permissions`.
    ///
    /// The effective permission set is the union of the direct claims and
    /// every resolved role. Unparsable permission strings are skipped with a
    /// warning rather than failing the whole request: a token minted before
    /// a permission was renamed should not lock the principal out entirely.
    pub fn into_user_info<F>(self, role_permissions: F) -> UserInfo
    where
        F: Fn(&str) -> Option<Vec<Permission>>,
    {
        let mut permissions: Vec<Permission> = Vec::new();

        for raw in &self.permissions {
            match raw.parse::<Permission>() {
                Ok(p) => permissions.push(p),
                Err(err) => warn!(subject = %self.sub, permission = %raw, %err, "skipping unparsable permission claim"),
            }
        }

        for role in &self.roles {
            match role_permissions(role) {
                Some(granted) => permissions.extend(granted),
                None => warn!(subject = %self.sub, role = %role, "token references unknown role"),
            }
        }

        permissions.sort_by_key(|p| p.to_string());
        permissions.dedup();

        UserInfo {
            username: self.sub,
            roles: self.roles,
            permissions,
        }
    }
}
