// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authorization checks.
//!
//! Every store and connector operation opens with a check against its static
//! `(action, resource)` pair. The check is a pure function of the
//! authenticated principal's permissions; a miss is the terminal `Forbidden`
//! error and is never retried.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::permissions::{Operation, Permission};
use crate::error::{StoreError, StoreResult};

/// Authenticated principal carried through every call.
///
/// `permissions` is the effective (flattened) set: the union of the token's
/// direct permission claims and the permissions of every resolved role.
/// Immutable for the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    /// Canonical principal name (JWT `sub` claim).
    pub username: String,
    /// Role names attached to the principal.
    pub roles: Vec<String>,
    /// Effective permissions.
    #[schema(value_type = Vec<String>)]
    pub permissions: Vec<Permission>,
}

impl UserInfo {
    /// Principal used when authentication is disabled (development mode).
    ///
    /// Grants `*:*`.
    pub fn anonymous() -> Self {
        Self {
            username: "anonymous".to_string(),
            roles: Vec::new(),
            permissions: vec![Permission {
                action: super::permissions::Action::Wildcard,
                resource: super::permissions::Resource::Wildcard,
            }],
        }
    }

    /// Whether any held permission covers the operation.
    pub fn can(&self, op: &Operation) -> bool {
        self.permissions.iter().any(|p| p.covers(op))
    }
}

/// Authorization check over a single principal.
///
/// Constructed per call; holds no state beyond the borrowed principal.
pub struct Authorizator<'a> {
    user: &'a UserInfo,
}

impl<'a> Authorizator<'a> {
    pub fn new(user: &'a UserInfo) -> Self {
        Self { user }
    }

    /// Check that the principal may perform the operation.
    pub fn check(&self, op: Operation) -> StoreResult<()> {
        if self.user.can(&op) {
            Ok(())
        } else {
            Err(StoreError::Forbidden(format!(
                "user {:?} is not allowed to perform {op}",
                self.user.username
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{Action, Resource};

    fn user_with(perms: &[&str]) -> UserInfo {
        UserInfo {
            username: "alice".to_string(),
            roles: vec![],
            permissions: perms.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn allows_exact_permission() {
        let user = user_with(&["sign:ethAccount"]);
        let auth = Authorizator::new(&user);
        assert!(auth
            .check(Operation::new(Action::Sign, Resource::EthAccount))
            .is_ok());
    }

    #[test]
    fn denies_missing_permission() {
        let user = user_with(&["read:key"]);
        let auth = Authorizator::new(&user);
        let err = auth
            .check(Operation::new(Action::Sign, Resource::EthAccount))
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
    }

    #[test]
    fn union_over_permissions() {
        let user = user_with(&["read:key", "sign:ethAccount"]);
        let auth = Authorizator::new(&user);
        assert!(auth
            .check(Operation::new(Action::Read, Resource::Key))
            .is_ok());
        assert!(auth
            .check(Operation::new(Action::Sign, Resource::EthAccount))
            .is_ok());
        assert!(auth
            .check(Operation::new(Action::Delete, Resource::EthAccount))
            .is_err());
    }

    #[test]
    fn anonymous_covers_everything() {
        let user = UserInfo::anonymous();
        let auth = Authorizator::new(&user);
        assert!(auth
            .check(Operation::new(Action::Destroy, Resource::EthAccount))
            .is_ok());
        assert!(auth
            .check(Operation::new(Action::Encrypt, Resource::Key))
            .is_ok());
    }
}
