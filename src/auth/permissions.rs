// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed permissions: `(action, resource)` pairs in `action:resource` string
//! form, with `*` accepted on either side.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Action half of a permission or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
    Destroy,
    Sign,
    Encrypt,
    /// Matches every action. String form `*`.
    #[serde(rename = "*")]
    Wildcard,
}

/// Resource half of a permission or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Secret,
    Key,
    EthAccount,
    Node,
    /// Matches every resource. String form `*`.
    #[serde(rename = "*")]
    Wildcard,
}

/// The `(action, resource)` pair checked by the authorizator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub action: Action,
    pub resource: Resource,
}

impl Operation {
    pub fn new(action: Action, resource: Resource) -> Self {
        Self { action, resource }
    }
}

/// A permission held by a principal or granted by a role.
///
/// Unlike [`Operation`], a permission may carry wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub action: Action,
    pub resource: Resource,
}

impl Permission {
    /// Whether this permission covers the given operation.
    ///
    /// Matching is exact on both halves; a wildcard half covers anything.
    pub fn covers(&self, op: &Operation) -> bool {
        let action_ok = self.action == Action::Wildcard || self.action == op.action;
        let resource_ok = self.resource == Resource::Wildcard || self.resource == op.resource;
        action_ok && resource_ok
    }
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Destroy => "destroy",
            Action::Sign => "sign",
            Action::Encrypt => "encrypt",
            Action::Wildcard => "*",
        }
    }
}

impl Resource {
    fn as_str(&self) -> &'static str {
        match self {
            Resource::Secret => "secret",
            Resource::Key => "key",
            Resource::EthAccount => "ethAccount",
            Resource::Node => "node",
            Resource::Wildcard => "*",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "delete" => Ok(Action::Delete),
            "destroy" => Ok(Action::Destroy),
            "sign" => Ok(Action::Sign),
            "encrypt" => Ok(Action::Encrypt),
            "*" => Ok(Action::Wildcard),
            other => Err(format!("unknown action {other:?}")),
        }
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secret" => Ok(Resource::Secret),
            "key" => Ok(Resource::Key),
            "ethAccount" => Ok(Resource::EthAccount),
            "node" => Ok(Resource::Node),
            "*" => Ok(Resource::Wildcard),
            other => Err(format!("unknown resource {other:?}")),
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    /// Parse the `action:resource` string form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, resource) = s
            .split_once(':')
            .ok_or_else(|| format!("permission {s:?} is not in action:resource form"))?;
        Ok(Permission {
            action: action.trim().parse()?,
            resource: resource.trim().parse()?,
        })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action.as_str(), self.resource.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action.as_str(), self.resource.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A named set of permissions, defined by a `Role` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_form() {
        let p: Permission = "sign:ethAccount".parse().unwrap();
        assert_eq!(p.action, Action::Sign);
        assert_eq!(p.resource, Resource::EthAccount);

        let p: Permission = "*:*".parse().unwrap();
        assert_eq!(p.action, Action::Wildcard);
        assert_eq!(p.resource, Resource::Wildcard);

        assert!("sign".parse::<Permission>().is_err());
        assert!("sing:ethAccount".parse::<Permission>().is_err());
    }

    #[test]
    fn exact_match_covers() {
        let p: Permission = "read:key".parse().unwrap();
        assert!(p.covers(&Operation::new(Action::Read, Resource::Key)));
        assert!(!p.covers(&Operation::new(Action::Write, Resource::Key)));
        assert!(!p.covers(&Operation::new(Action::Read, Resource::EthAccount)));
    }

    #[test]
    fn wildcard_covers_everything() {
        let p: Permission = "*:*".parse().unwrap();
        for action in [Action::Read, Action::Write, Action::Delete, Action::Sign] {
            for resource in [Resource::Secret, Resource::Key, Resource::EthAccount] {
                assert!(p.covers(&Operation::new(action, resource)));
            }
        }
    }

    #[test]
    fn half_wildcards() {
        let p: Permission = "read:*".parse().unwrap();
        assert!(p.covers(&Operation::new(Action::Read, Resource::Node)));
        assert!(!p.covers(&Operation::new(Action::Write, Resource::Node)));

        let p: Permission = "*:ethAccount".parse().unwrap();
        assert!(p.covers(&Operation::new(Action::Destroy, Resource::EthAccount)));
        assert!(!p.covers(&Operation::new(Action::Destroy, Resource::Key)));
    }

    #[test]
    fn display_round_trips() {
        for s in ["read:secret", "destroy:ethAccount", "*:*", "encrypt:key"] {
            let p: Permission = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let p: Permission = "sign:ethAccount".parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#""sign:ethAccount""#);
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
