// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backend-agnostic key store contract.
//!
//! Every backend — local, vault, cloud HSM — implements this one surface.
//! Backends never see the Ethereum domain: they hold keys by opaque id and
//! sign 32-byte digests. Two contract points the connector relies on:
//!
//! - `sign` returns the 64-byte `r ‖ s` concatenation and never computes the
//!   recovery id.
//! - `restore` and `destroy` may return `NotSupported`; the connector
//!   swallows that for those two operations only.

use async_trait::async_trait;

use super::entities::{Algorithm, Attributes, Key};
use crate::error::StoreResult;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Generate a new key under the given id.
    async fn create(
        &self,
        id: &str,
        algorithm: &Algorithm,
        attributes: &Attributes,
    ) -> StoreResult<Key>;

    /// Import existing private key material under the given id.
    async fn import(
        &self,
        id: &str,
        private_key: &[u8],
        algorithm: &Algorithm,
        attributes: &Attributes,
    ) -> StoreResult<Key>;

    /// Fetch a live key.
    async fn get(&self, id: &str) -> StoreResult<Key>;

    /// List live key ids.
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Replace the key's attributes.
    async fn update(&self, id: &str, attributes: &Attributes) -> StoreResult<Key>;

    /// Soft-delete a key.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Fetch a soft-deleted key.
    async fn get_deleted(&self, id: &str) -> StoreResult<Key>;

    /// List soft-deleted key ids.
    async fn list_deleted(&self) -> StoreResult<Vec<String>>;

    /// Bring a soft-deleted key back. May be `NotSupported`.
    async fn restore(&self, id: &str) -> StoreResult<()>;

    /// Permanently remove a key. May be `NotSupported`.
    async fn destroy(&self, id: &str) -> StoreResult<()>;

    /// Sign a 32-byte digest. Returns the 64-byte `r ‖ s` pair.
    async fn sign(&self, id: &str, digest: &[u8]) -> StoreResult<Vec<u8>>;

    /// Encrypt with the key. May be `NotSupported`.
    async fn encrypt(&self, id: &str, data: &[u8]) -> StoreResult<Vec<u8>>;

    /// Decrypt with the key. May be `NotSupported`.
    async fn decrypt(&self, id: &str, data: &[u8]) -> StoreResult<Vec<u8>>;
}
