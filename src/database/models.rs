// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Database row types for the metadata cache.
//!
//! The cache keeps account/key/secret *metadata* only — private key material
//! never leaves the backing store. Rows are JSON-serialized into redb tables
//! and carry the soft-delete timestamp that drives visibility.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::stores::entities::Algorithm;

/// Common shape every cached row satisfies.
///
/// `db_key` is the row's primary key within its table; `deleted_at` drives
/// live/deleted visibility; `touch` bumps the update timestamp.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name this record type lives in.
    const TABLE: &'static str;

    fn db_key(&self) -> String;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);
    fn touch(&mut self);
}

/// Cached Ethereum account row. Primary key: `(store_id, address)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthAccountRecord {
    /// Lowercase 0x-prefixed hex address.
    pub address: String,
    pub store_id: String,
    /// Identifier of the key inside the backing store.
    pub key_id: String,
    /// Uncompressed public key (65 bytes).
    pub public_key: Vec<u8>,
    /// Compressed public key (33 bytes).
    pub compressed_public_key: Vec<u8>,
    pub tags: HashMap<String, String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EthAccountRecord {
    /// Composite key for the `eth_accounts` table.
    pub fn key_for(store_id: &str, address: &str) -> String {
        format!("{}|{}", store_id, address.to_lowercase())
    }
}

impl Record for EthAccountRecord {
    const TABLE: &'static str = "eth_accounts";

    fn db_key(&self) -> String {
        Self::key_for(&self.store_id, &self.address)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Cached key row. Primary key: `(store_id, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: String,
    pub store_id: String,
    pub public_key: Vec<u8>,
    pub algorithm: Algorithm,
    pub tags: HashMap<String, String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn key_for(store_id: &str, id: &str) -> String {
        format!("{store_id}|{id}")
    }
}

impl Record for KeyRecord {
    const TABLE: &'static str = "keys";

    fn db_key(&self) -> String {
        Self::key_for(&self.store_id, &self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Cached secret metadata row. Primary key: `(store_id, id)`.
///
/// Secret values stay in the backing store; only lifecycle metadata is
/// cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub id: String,
    pub store_id: String,
    pub tags: HashMap<String, String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    pub fn key_for(store_id: &str, id: &str) -> String {
        format!("{store_id}|{id}")
    }
}

impl Record for SecretRecord {
    const TABLE: &'static str = "secrets";

    fn db_key(&self) -> String {
        Self::key_for(&self.store_id, &self.id)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
