// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Metadata Cache
//!
//! Relational cache of account/key/secret metadata with soft-delete
//! semantics, backed by an embedded redb database. Private key material is
//! never stored here — the backing stores own it; a row in this cache is the
//! authoritative *handle*: once a row is soft-deleted the resource is gone
//! from the caller's point of view even if the store still holds the key.

pub mod models;
pub mod store;

pub use models::{EthAccountRecord, KeyRecord, Record, SecretRecord};
pub use store::{DbError, DbResult, EntityDb, EntityTxn, MetadataDb};
