// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Manifest document model.
//!
//! A manifest declares one resource: a key/secret store, an Ethereum store,
//! a downstream node, or a role. `specs` stays opaque to the loader — each
//! consumer parses the shape its kind demands.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::Permission;

/// Resource kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    HashicorpSecrets,
    HashicorpKeys,
    AKVKeys,
    AWSKeys,
    LocalKeys,
    Ethereum,
    Node,
    Role,
}

/// One declarative resource description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: Kind,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub specs: serde_yaml::Value,
}

impl Manifest {
    /// Structural validation applied by the loader to every document.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("manifest name must not be empty".to_string());
        }
        if self.version.trim().is_empty() {
            return Err(format!("manifest {:?} has an empty version", self.name));
        }
        Ok(())
    }
}

/// `Ethereum` manifest specs: which key store holds the account keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumSpecs {
    pub key_store: String,
}

/// `Node` manifest specs: downstream endpoints and mapped stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpecs {
    /// JSON-RPC HTTP endpoint.
    pub rpc_url: String,
    /// JSON-RPC WebSocket endpoint, when the node speaks it.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Tessera-compatible privacy manager endpoint for Quorum private
    /// transactions.
    #[serde(default)]
    pub privacy_manager_url: Option<String>,
    /// Ethereum stores mapped to this node, in precedence order: when the
    /// same address exists in several stores, the first listed wins.
    #[serde(default)]
    pub stores: Vec<String>,
    /// Downstream request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry budget for 429/503 responses from the node.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// `Role` manifest specs: the permission set the role grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpecs {
    pub permissions: Vec<Permission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_node_manifest() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
kind: Node
version: "1"
name: besu-mainnet
tags:
  env: prod
specs:
  rpcUrl: http://besu:8545
  wsUrl: ws://besu:8546
  stores: [eth-accounts]
"#,
        )
        .unwrap();

        assert_eq!(manifest.kind, Kind::Node);
        assert_eq!(manifest.name, "besu-mainnet");
        manifest.validate().unwrap();

        let specs: NodeSpecs = serde_yaml::from_value(manifest.specs).unwrap();
        assert_eq!(specs.rpc_url, "http://besu:8545");
        assert_eq!(specs.ws_url.as_deref(), Some("ws://besu:8546"));
        assert_eq!(specs.stores, vec!["eth-accounts".to_string()]);
        assert_eq!(specs.request_timeout_secs, 30);
        assert_eq!(specs.max_retries, 3);
    }

    #[test]
    fn parses_a_role_manifest() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
kind: Role
version: "1"
name: signer
specs:
  permissions:
    - "sign:ethAccount"
    - "read:ethAccount"
"#,
        )
        .unwrap();

        let specs: RoleSpecs = serde_yaml::from_value(manifest.specs).unwrap();
        assert_eq!(specs.permissions.len(), 2);
    }

    #[test]
    fn parses_an_ethereum_manifest() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
kind: Ethereum
version: "1"
name: eth-accounts
specs:
  keyStore: local-keys
"#,
        )
        .unwrap();

        let specs: EthereumSpecs = serde_yaml::from_value(manifest.specs).unwrap();
        assert_eq!(specs.key_store, "local-keys");
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let result: Result<Manifest, _> = serde_yaml::from_str(
            r#"
kind: FloppyDisk
version: "1"
name: x
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_name_fails_validation() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
kind: LocalKeys
version: "1"
name: ""
"#,
        )
        .unwrap();
        assert!(manifest.validate().is_err());
    }
}
