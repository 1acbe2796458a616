// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory secp256k1 key store.
//!
//! The driver behind `LocalKeys` manifests. Keys live in process memory for
//! the lifetime of the service; nothing is persisted. Useful for development
//! and as the reference implementation of the store contract — production
//! deployments point manifests at an external backend instead.

use std::collections::HashMap;

use async_trait::async_trait;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use tokio::sync::RwLock;

use super::entities::{Algorithm, Attributes, Curve, Key, KeyMetadata, KeyType};
use super::keystore::KeyStore;
use crate::error::{StoreError, StoreResult};

struct StoredKey {
    signing_key: SigningKey,
    key: Key,
}

/// In-memory key store keyed by opaque id.
#[derive(Default)]
pub struct LocalKeyStore {
    keys: RwLock<HashMap<String, StoredKey>>,
}

impl LocalKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_algorithm(algorithm: &Algorithm) -> StoreResult<()> {
        if algorithm.key_type != KeyType::Ecdsa || algorithm.curve != Curve::Secp256k1 {
            return Err(StoreError::NotSupported(format!(
                "local store only holds Ecdsa/Secp256k1 keys, got {:?}/{:?}",
                algorithm.key_type, algorithm.curve
            )));
        }
        Ok(())
    }

    fn build_key(id: &str, signing_key: &SigningKey, attributes: &Attributes) -> Key {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Key {
            id: id.to_string(),
            public_key,
            algorithm: Algorithm::ecdsa_secp256k1(),
            attributes: attributes.clone(),
            metadata: KeyMetadata::now(),
        }
    }

    async fn insert(
        &self,
        id: &str,
        signing_key: SigningKey,
        attributes: &Attributes,
    ) -> StoreResult<Key> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(id) {
            return Err(StoreError::AlreadyExists(format!("key {id:?} already exists")));
        }
        let key = Self::build_key(id, &signing_key, attributes);
        keys.insert(id.to_string(), StoredKey { signing_key, key: key.clone() });
        Ok(key)
    }
}

#[async_trait]
impl KeyStore for LocalKeyStore {
    async fn create(
        &self,
        id: &str,
        algorithm: &Algorithm,
        attributes: &Attributes,
    ) -> StoreResult<Key> {
        Self::check_algorithm(algorithm)?;
        self.insert(id, SigningKey::random(&mut OsRng), attributes).await
    }

    async fn import(
        &self,
        id: &str,
        private_key: &[u8],
        algorithm: &Algorithm,
        attributes: &Attributes,
    ) -> StoreResult<Key> {
        Self::check_algorithm(algorithm)?;
        let signing_key = SigningKey::from_slice(private_key)
            .map_err(|_| StoreError::InvalidParameter("invalid secp256k1 private key".to_string()))?;
        self.insert(id, signing_key, attributes).await
    }

    async fn get(&self, id: &str) -> StoreResult<Key> {
        let keys = self.keys.read().await;
        keys.get(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_none())
            .map(|stored| stored.key.clone())
            .ok_or_else(|| StoreError::NotFound(format!("key {id:?} not found")))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let keys = self.keys.read().await;
        let mut ids: Vec<String> = keys
            .values()
            .filter(|stored| stored.key.metadata.deleted_at.is_none())
            .map(|stored| stored.key.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn update(&self, id: &str, attributes: &Attributes) -> StoreResult<Key> {
        let mut keys = self.keys.write().await;
        let stored = keys
            .get_mut(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("key {id:?} not found")))?;
        stored.key.attributes = attributes.clone();
        stored.key.metadata.updated_at = chrono::Utc::now();
        Ok(stored.key.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        let stored = keys
            .get_mut(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("key {id:?} not found")))?;
        stored.key.metadata.deleted_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn get_deleted(&self, id: &str) -> StoreResult<Key> {
        let keys = self.keys.read().await;
        keys.get(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_some())
            .map(|stored| stored.key.clone())
            .ok_or_else(|| StoreError::NotFound(format!("deleted key {id:?} not found")))
    }

    async fn list_deleted(&self) -> StoreResult<Vec<String>> {
        let keys = self.keys.read().await;
        let mut ids: Vec<String> = keys
            .values()
            .filter(|stored| stored.key.metadata.deleted_at.is_some())
            .map(|stored| stored.key.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn restore(&self, id: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        let stored = keys
            .get_mut(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_some())
            .ok_or_else(|| StoreError::NotFound(format!("deleted key {id:?} not found")))?;
        stored.key.metadata.deleted_at = None;
        stored.key.metadata.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn destroy(&self, id: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        match keys.get(id) {
            Some(stored) if stored.key.metadata.deleted_at.is_some() => {
                keys.remove(id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("deleted key {id:?} not found"))),
        }
    }

    async fn sign(&self, id: &str, digest: &[u8]) -> StoreResult<Vec<u8>> {
        if digest.len() != 32 {
            return Err(StoreError::InvalidParameter(format!(
                "digest must be 32 bytes, got {}",
                digest.len()
            )));
        }

        let keys = self.keys.read().await;
        let stored = keys
            .get(id)
            .filter(|stored| stored.key.metadata.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("key {id:?} not found")))?;

        if stored.key.metadata.disabled {
            return Err(StoreError::Forbidden(format!("key {id:?} is disabled")));
        }

        let signature: Signature = stored
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| StoreError::Internal(format!("signing failed: {e}")))?;
        Ok(signature.to_bytes().to_vec())
    }

    async fn encrypt(&self, _id: &str, _data: &[u8]) -> StoreResult<Vec<u8>> {
        Err(StoreError::NotSupported(
            "local store does not encrypt".to_string(),
        ))
    }

    async fn decrypt(&self, _id: &str, _data: &[u8]) -> StoreResult<Vec<u8>> {
        Err(StoreError::NotSupported(
            "local store does not decrypt".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> Attributes {
        Attributes::default()
    }

    #[tokio::test]
    async fn create_get_list() {
        let store = LocalKeyStore::new();
        let key = store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();
        assert_eq!(key.public_key.len(), 33);

        let fetched = store.get("k1").await.unwrap();
        assert_eq!(fetched.public_key, key.public_key);
        assert_eq!(store.list().await.unwrap(), vec!["k1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let store = LocalKeyStore::new();
        store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();
        let err = store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn unsupported_curve_rejected() {
        let store = LocalKeyStore::new();
        let algorithm = Algorithm {
            key_type: KeyType::Eddsa,
            curve: Curve::Babyjubjub,
        };
        let err = store.create("k1", &algorithm, &attrs()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotSupported(_)));
    }

    #[tokio::test]
    async fn import_is_deterministic() {
        let store = LocalKeyStore::new();
        let private_key =
            alloy::hex::decode("56202652fdffd802b7252a456dbd8f3ecc0352bbde76c23b40afe8aebd714e2e")
                .unwrap();
        let key = store
            .import("k1", &private_key, &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();

        let expected = SigningKey::from_slice(&private_key)
            .unwrap()
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        assert_eq!(key.public_key, expected);
    }

    #[tokio::test]
    async fn sign_returns_64_byte_rs() {
        let store = LocalKeyStore::new();
        store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();
        let signature = store.sign("k1", &[7u8; 32]).await.unwrap();
        assert_eq!(signature.len(), 64);

        let err = store.sign("k1", &[7u8; 31]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn delete_restore_destroy_lifecycle() {
        let store = LocalKeyStore::new();
        store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();

        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.is_err());
        assert!(store.get_deleted("k1").await.is_ok());
        assert_eq!(store.list_deleted().await.unwrap(), vec!["k1".to_string()]);

        store.restore("k1").await.unwrap();
        assert!(store.get("k1").await.is_ok());

        store.delete("k1").await.unwrap();
        store.destroy("k1").await.unwrap();
        assert!(store.get_deleted("k1").await.is_err());
    }

    #[tokio::test]
    async fn destroy_requires_prior_delete() {
        let store = LocalKeyStore::new();
        store
            .create("k1", &Algorithm::ecdsa_secp256k1(), &attrs())
            .await
            .unwrap();
        assert!(store.destroy("k1").await.is_err());
    }

    #[tokio::test]
    async fn encrypt_decrypt_not_supported() {
        let store = LocalKeyStore::new();
        assert!(matches!(
            store.encrypt("k1", b"data").await,
            Err(StoreError::NotSupported(_))
        ));
        assert!(matches!(
            store.decrypt("k1", b"data").await,
            Err(StoreError::NotSupported(_))
        ));
    }
}
