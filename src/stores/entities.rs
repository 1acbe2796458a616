// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key-store entities shared by every backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Signature scheme of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum KeyType {
    Ecdsa,
    Eddsa,
}

/// Elliptic curve of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Curve {
    Secp256k1,
    Babyjubjub,
}

/// Key algorithm: type and curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Algorithm {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub curve: Curve,
}

impl Algorithm {
    /// The algorithm every Ethereum account key uses.
    pub fn ecdsa_secp256k1() -> Self {
        Self {
            key_type: KeyType::Ecdsa,
            curve: Curve::Secp256k1,
        }
    }
}

/// Caller-supplied attributes attached to a key at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attributes {
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Lifecycle metadata maintained by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub expire_at: Option<DateTime<Utc>>,
    pub disabled: bool,
}

impl KeyMetadata {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            expire_at: None,
            disabled: false,
        }
    }
}

/// A key as seen through the store contract. Public material only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Key {
    /// Store-scoped identifier.
    pub id: String,
    /// Public key material. For secp256k1: 33-byte compressed SEC1 point.
    pub public_key: Vec<u8>,
    pub algorithm: Algorithm,
    pub attributes: Attributes,
    pub metadata: KeyMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_serializes_with_type_field() {
        let json = serde_json::to_value(Algorithm::ecdsa_secp256k1()).unwrap();
        assert_eq!(json["type"], "Ecdsa");
        assert_eq!(json["curve"], "Secp256k1");
    }

    #[test]
    fn fresh_metadata_is_live() {
        let meta = KeyMetadata::now();
        assert!(meta.deleted_at.is_none());
        assert!(!meta.disabled);
    }
}
