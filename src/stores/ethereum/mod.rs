// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ethereum account connector.
//!
//! Composes the authorization layer, the metadata cache and a backend key
//! store into the Ethereum account API. Every operation opens with a
//! permission check; account handles live in the cache while key material
//! stays in the store. Deleting on one side never implies the other except
//! through the restore/destroy protocol below.

pub mod signing;
pub mod types;

use std::sync::Arc;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::auth::{Action, Authorizator, Operation, Resource, UserInfo};
use crate::database::{EntityDb, EthAccountRecord};
use crate::error::{StoreError, StoreResult};
use crate::stores::entities::{Algorithm, Attributes, Key};
use crate::stores::keystore::KeyStore;

use signing::{
    encode_eea_private, encode_quorum_private, eea_signature_hash, eip191_digest,
    EeaPrivacy, PreparedTx, SignatureParts,
};
use types::TransactionArgs;

/// Lowercase 0x-hex form used as the cache key and wire representation.
fn lower_hex(address: &Address) -> String {
    format!("0x{}", alloy::hex::encode(address))
}

/// The Ethereum-domain adapter over one backend store plus the account cache.
pub struct EthConnector {
    store_id: String,
    store: Arc<dyn KeyStore>,
    db: EntityDb<EthAccountRecord>,
}

impl EthConnector {
    pub fn new(store_id: impl Into<String>, store: Arc<dyn KeyStore>, db: EntityDb<EthAccountRecord>) -> Self {
        Self {
            store_id: store_id.into(),
            store,
            db,
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    fn account_key(&self, address: &Address) -> String {
        EthAccountRecord::key_for(&self.store_id, &lower_hex(address))
    }

    fn check(&self, user: &UserInfo, action: Action) -> StoreResult<()> {
        Authorizator::new(user).check(Operation::new(action, Resource::EthAccount))
    }

    /// Generate a new account key in the store and register its handle.
    pub async fn create(
        &self,
        user: &UserInfo,
        key_id: &str,
        tags: std::collections::HashMap<String, String>,
    ) -> StoreResult<EthAccountRecord> {
        self.check(user, Action::Write)?;
        debug!(store = %self.store_id, key_id, "creating ethereum account");

        let key = self
            .store
            .create(key_id, &Algorithm::ecdsa_secp256k1(), &Attributes { tags, disabled: false })
            .await?;
        let record = self.insert_account(key).await?;
        info!(store = %self.store_id, address = %record.address, "ethereum account created");
        Ok(record)
    }

    /// Import an existing private key and register its handle.
    pub async fn import(
        &self,
        user: &UserInfo,
        key_id: &str,
        private_key: &[u8],
        tags: std::collections::HashMap<String, String>,
    ) -> StoreResult<EthAccountRecord> {
        self.check(user, Action::Write)?;
        debug!(store = %self.store_id, key_id, "importing ethereum account");

        let key = self
            .store
            .import(key_id, private_key, &Algorithm::ecdsa_secp256k1(), &Attributes { tags, disabled: false })
            .await?;
        let record = self.insert_account(key).await?;
        info!(store = %self.store_id, address = %record.address, "ethereum account imported");
        Ok(record)
    }

    /// Register the cache row for a freshly created/imported key.
    ///
    /// If the insert fails the key would be stranded in the store, so a
    /// best-effort compensating destroy runs in the background while the DB
    /// error goes back to the caller.
    async fn insert_account(&self, key: Key) -> StoreResult<EthAccountRecord> {
        let (public_key, compressed_public_key) = signing::public_key_encodings(&key.public_key)?;
        let address = signing::address_from_public_key(&public_key)?;
        let now = Utc::now();

        let record = EthAccountRecord {
            address: lower_hex(&address),
            store_id: self.store_id.clone(),
            key_id: key.id.clone(),
            public_key,
            compressed_public_key,
            tags: key.attributes.tags,
            disabled: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        match self.db.add(&record) {
            Ok(record) => Ok(record),
            Err(db_err) => {
                let store = Arc::clone(&self.store);
                let store_id = self.store_id.clone();
                let key_id = key.id;
                tokio::spawn(async move {
                    let _ = store.delete(&key_id).await;
                    match store.destroy(&key_id).await {
                        Ok(()) => info!(store = %store_id, key_id, "destroyed key after failed account insert"),
                        Err(err) => {
                            warn!(store = %store_id, key_id, %err, "compensating destroy failed, key may be orphaned")
                        }
                    }
                });
                Err(db_err.into())
            }
        }
    }

    /// Fetch a live account.
    pub fn get(&self, user: &UserInfo, address: &Address) -> StoreResult<EthAccountRecord> {
        self.check(user, Action::Read)?;
        Ok(self.db.get(&self.account_key(address))?)
    }

    /// Fetch a soft-deleted account.
    pub fn get_deleted(&self, user: &UserInfo, address: &Address) -> StoreResult<EthAccountRecord> {
        self.check(user, Action::Read)?;
        Ok(self.db.get_deleted(&self.account_key(address))?)
    }

    /// List live accounts in this store.
    pub fn list(&self, user: &UserInfo) -> StoreResult<Vec<EthAccountRecord>> {
        self.check(user, Action::Read)?;
        Ok(self
            .db
            .get_all()?
            .into_iter()
            .filter(|r| r.store_id == self.store_id)
            .collect())
    }

    /// List soft-deleted accounts in this store.
    pub fn list_deleted(&self, user: &UserInfo) -> StoreResult<Vec<EthAccountRecord>> {
        self.check(user, Action::Read)?;
        Ok(self
            .db
            .get_all_deleted()?
            .into_iter()
            .filter(|r| r.store_id == self.store_id)
            .collect())
    }

    /// Replace an account's tags.
    pub fn update(
        &self,
        user: &UserInfo,
        address: &Address,
        tags: std::collections::HashMap<String, String>,
    ) -> StoreResult<EthAccountRecord> {
        self.check(user, Action::Write)?;
        let mut record = self.db.get(&self.account_key(address))?;
        record.tags = tags;
        Ok(self.db.update(&record)?)
    }

    /// Soft-delete the account in both the cache and the store.
    pub async fn delete(&self, user: &UserInfo, address: &Address) -> StoreResult<()> {
        self.check(user, Action::Delete)?;
        let key = self.account_key(address);
        let record = self.db.get(&key)?;

        let txn = self.db.begin()?;
        txn.delete(&key)?;
        if let Err(err) = self.store.delete(&record.key_id).await {
            txn.abort()?;
            return Err(err);
        }
        txn.commit()?;

        info!(store = %self.store_id, address = %record.address, "ethereum account deleted");
        Ok(())
    }

    /// Bring a soft-deleted account back.
    ///
    /// Idempotent when the account is already live. A store that does not
    /// support restore leaves the key untouched and the cache row is
    /// restored alone.
    pub async fn restore(&self, user: &UserInfo, address: &Address) -> StoreResult<()> {
        self.check(user, Action::Delete)?;
        let key = self.account_key(address);

        if self.db.get(&key).is_ok() {
            return Ok(());
        }
        let record = self.db.get_deleted(&key)?;

        let txn = self.db.begin()?;
        txn.restore(&key)?;
        match self.store.restore(&record.key_id).await {
            Ok(()) => {}
            Err(StoreError::NotSupported(_)) => {
                debug!(store = %self.store_id, address = %record.address, "store does not support restore, cache row restored alone")
            }
            Err(err) => {
                txn.abort()?;
                return Err(err);
            }
        }
        txn.commit()?;

        info!(store = %self.store_id, address = %record.address, "ethereum account restored");
        Ok(())
    }

    /// Permanently remove a soft-deleted account from cache and store.
    pub async fn destroy(&self, user: &UserInfo, address: &Address) -> StoreResult<()> {
        self.check(user, Action::Destroy)?;
        let key = self.account_key(address);
        let record = self.db.get_deleted(&key)?;

        let txn = self.db.begin()?;
        txn.purge(&key)?;
        match self.store.destroy(&record.key_id).await {
            Ok(()) => {}
            Err(StoreError::NotSupported(_)) => {
                debug!(store = %self.store_id, address = %record.address, "store does not support destroy, cache row purged alone")
            }
            Err(err) => {
                txn.abort()?;
                return Err(err);
            }
        }
        txn.commit()?;

        info!(store = %self.store_id, address = %record.address, "ethereum account destroyed");
        Ok(())
    }

    /// Load the live, enabled signing account.
    fn signing_account(&self, address: &Address) -> StoreResult<EthAccountRecord> {
        let record = self.db.get(&self.account_key(address))?;
        if record.disabled {
            return Err(StoreError::Forbidden(format!(
                "account {} is disabled",
                record.address
            )));
        }
        Ok(record)
    }

    async fn signature_for(
        &self,
        record: &EthAccountRecord,
        digest: B256,
    ) -> StoreResult<SignatureParts> {
        let raw = self.store.sign(&record.key_id, digest.as_slice()).await?;
        signing::finalize_signature(&raw, &digest, &record.public_key)
    }

    /// `eth_sign` / `personal_sign`: sign the EIP-191 prefixed digest.
    /// Returns the 65-byte `r ‖ s ‖ v` signature.
    pub async fn sign_message(
        &self,
        user: &UserInfo,
        address: &Address,
        data: &[u8],
    ) -> StoreResult<Vec<u8>> {
        self.check(user, Action::Sign)?;
        let record = self.signing_account(address)?;
        let parts = self.signature_for(&record, eip191_digest(data)).await?;
        Ok(parts.to_eth_bytes().to_vec())
    }

    /// EIP-712: sign the typed-data hash.
    pub async fn sign_typed_data(
        &self,
        user: &UserInfo,
        address: &Address,
        typed_data: &serde_json::Value,
    ) -> StoreResult<Vec<u8>> {
        self.check(user, Action::Sign)?;
        let record = self.signing_account(address)?;

        let typed: TypedData = serde_json::from_value(typed_data.clone())
            .map_err(|e| StoreError::InvalidFormat(format!("invalid typed data: {e}")))?;
        let digest = typed
            .eip712_signing_hash()
            .map_err(|e| StoreError::InvalidParameter(format!("typed data hashing failed: {e}")))?;

        let parts = self.signature_for(&record, digest).await?;
        Ok(parts.to_eth_bytes().to_vec())
    }

    /// Sign a public transaction; returns the raw payload for
    /// `eth_sendRawTransaction`.
    pub async fn sign_transaction(
        &self,
        user: &UserInfo,
        address: &Address,
        args: &TransactionArgs,
    ) -> StoreResult<Vec<u8>> {
        self.check(user, Action::Sign)?;
        let record = self.signing_account(address)?;

        let prepared = PreparedTx::build(args)?;
        let parts = self.signature_for(&record, prepared.signature_hash()).await?;
        Ok(prepared.into_raw(parts))
    }

    /// Sign a Quorum private transaction (v ∈ {37, 38}); the calldata must
    /// already carry the Tessera payload hash.
    pub async fn sign_private_transaction(
        &self,
        user: &UserInfo,
        address: &Address,
        args: &TransactionArgs,
    ) -> StoreResult<Vec<u8>> {
        self.check(user, Action::Sign)?;
        let record = self.signing_account(address)?;

        // Quorum private transactions sign the homestead digest.
        let tx = alloy::consensus::TxLegacy {
            chain_id: None,
            nonce: args.nonce()?,
            gas_price: args.gas_price()?,
            gas_limit: args.gas_limit()?,
            to: args.tx_kind(),
            value: args.value.unwrap_or_default(),
            input: args.calldata(),
        };
        use alloy::consensus::SignableTransaction;
        let parts = self.signature_for(&record, tx.signature_hash()).await?;
        Ok(encode_quorum_private(&tx, &parts))
    }

    /// Sign an EEA private transaction; the digest covers the privacy fields.
    pub async fn sign_eea_transaction(
        &self,
        user: &UserInfo,
        address: &Address,
        args: &TransactionArgs,
    ) -> StoreResult<Vec<u8>> {
        self.check(user, Action::Sign)?;
        let record = self.signing_account(address)?;

        let privacy = EeaPrivacy::from_args(args)?;
        let tx = alloy::consensus::TxLegacy {
            chain_id: args.effective_chain_id(),
            nonce: args.nonce()?,
            gas_price: args.gas_price.map(|p| p.to::<u128>()).unwrap_or_default(),
            gas_limit: args.gas_limit()?,
            to: args.tx_kind(),
            value: args.value.unwrap_or_default(),
            input: args.calldata(),
        };

        let parts = self
            .signature_for(&record, eea_signature_hash(&tx, &privacy))
            .await?;
        Ok(encode_eea_private(&tx, &privacy, &parts))
    }
}
