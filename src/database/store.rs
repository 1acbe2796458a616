// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded metadata cache backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `eth_accounts`: `store_id|address` → serialized [`EthAccountRecord`]
//! - `keys`: `store_id|id` → serialized [`KeyRecord`]
//! - `secrets`: `store_id|id` → serialized [`SecretRecord`]
//!
//! Every table follows the same soft-delete protocol: `delete` stamps
//! `deleted_at`, `restore` clears it, `purge` removes the row, and the
//! live/deleted read paths are mutually exclusive. Multi-step operations run
//! inside a single redb write transaction; an error aborts the transaction
//! and leaves no partial state.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{ReadableTable, TableDefinition};

use super::models::{EthAccountRecord, KeyRecord, Record, SecretRecord};
use crate::error::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => StoreError::NotFound(format!("{what} not found")),
            DbError::AlreadyExists(what) => {
                StoreError::AlreadyExists(format!("{what} already exists"))
            }
            other => StoreError::Internal(format!("database error: {other}")),
        }
    }
}

fn table_for<R: Record>() -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(R::TABLE)
}

/// Handle to the metadata database file.
///
/// Cheap to clone; typed entity views are created per record type.
#[derive(Clone)]
pub struct MetadataDb {
    db: Arc<redb::Database>,
}

impl MetadataDb {
    /// Open (or create) the database and make sure all tables exist, so the
    /// read paths never race table creation.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let db = redb::Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(table_for::<EthAccountRecord>())?;
            txn.open_table(table_for::<KeyRecord>())?;
            txn.open_table(table_for::<SecretRecord>())?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn eth_accounts(&self) -> EntityDb<EthAccountRecord> {
        EntityDb::new(self.db.clone())
    }

    pub fn keys(&self) -> EntityDb<KeyRecord> {
        EntityDb::new(self.db.clone())
    }

    pub fn secrets(&self) -> EntityDb<SecretRecord> {
        EntityDb::new(self.db.clone())
    }
}

/// Typed view over one entity table.
#[derive(Clone)]
pub struct EntityDb<R: Record> {
    db: Arc<redb::Database>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> EntityDb<R> {
    fn new(db: Arc<redb::Database>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    /// Begin a write transaction scoped to this entity table.
    ///
    /// redb serializes write transactions, which gives concurrent callers on
    /// the same primary key the isolation the soft-delete protocol needs.
    pub fn begin(&self) -> DbResult<EntityTxn<R>> {
        Ok(EntityTxn {
            txn: self.db.begin_write()?,
            _marker: PhantomData,
        })
    }

    /// Run `f` atomically: commit on success, roll every write back on error.
    pub fn run_in_transaction<T>(
        &self,
        f: impl FnOnce(&EntityTxn<R>) -> DbResult<T>,
    ) -> DbResult<T> {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }

    /// Insert a new row. Fails `AlreadyExists` on a primary-key conflict.
    pub fn add(&self, record: &R) -> DbResult<R> {
        self.run_in_transaction(|txn| txn.add(record))
    }

    /// Fetch a live (non-soft-deleted) row.
    pub fn get(&self, key: &str) -> DbResult<R> {
        self.read(key)?
            .filter(|r| r.deleted_at().is_none())
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }

    /// Fetch a soft-deleted row.
    pub fn get_deleted(&self, key: &str) -> DbResult<R> {
        self.read(key)?
            .filter(|r| r.deleted_at().is_some())
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }

    /// All live rows, in key order.
    pub fn get_all(&self) -> DbResult<Vec<R>> {
        self.scan(|r| r.deleted_at().is_none())
    }

    /// All soft-deleted rows, in key order.
    pub fn get_all_deleted(&self) -> DbResult<Vec<R>> {
        self.scan(|r| r.deleted_at().is_some())
    }

    /// Update mutable fields of a live row; bumps `updated_at`.
    pub fn update(&self, record: &R) -> DbResult<R> {
        self.run_in_transaction(|txn| txn.update(record))
    }

    /// Soft-delete a live row.
    pub fn delete(&self, key: &str) -> DbResult<R> {
        self.run_in_transaction(|txn| txn.delete(key))
    }

    /// Bring a soft-deleted row back to live.
    pub fn restore(&self, key: &str) -> DbResult<R> {
        self.run_in_transaction(|txn| txn.restore(key))
    }

    /// Hard-remove a soft-deleted row.
    pub fn purge(&self, key: &str) -> DbResult<()> {
        self.run_in_transaction(|txn| txn.purge(key))
    }

    fn read(&self, key: &str) -> DbResult<Option<R>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table_for::<R>())?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn scan(&self, keep: impl Fn(&R) -> bool) -> DbResult<Vec<R>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table_for::<R>())?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let record: R = serde_json::from_slice(value.value())?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

/// An open write transaction over one entity table.
///
/// Obtained from [`EntityDb::begin`]; the caller decides between `commit`
/// and `abort`. Used directly by the connector when a backend call has to
/// happen between the table writes and the commit.
pub struct EntityTxn<R: Record> {
    txn: redb::WriteTransaction,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> EntityTxn<R> {
    pub fn commit(self) -> DbResult<()> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn abort(self) -> DbResult<()> {
        self.txn.abort()?;
        Ok(())
    }

    pub fn add(&self, record: &R) -> DbResult<R> {
        let key = record.db_key();
        let table = self.txn.open_table(table_for::<R>())?;
        if table.get(key.as_str())?.is_some() {
            return Err(DbError::AlreadyExists(key));
        }
        drop(table);
        self.write(record)?;
        Ok(record.clone())
    }

    pub fn get(&self, key: &str) -> DbResult<R> {
        self.read(key)?
            .filter(|r| r.deleted_at().is_none())
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }

    pub fn get_deleted(&self, key: &str) -> DbResult<R> {
        self.read(key)?
            .filter(|r| r.deleted_at().is_some())
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }

    pub fn update(&self, record: &R) -> DbResult<R> {
        let key = record.db_key();
        self.get(&key)?;
        let mut updated = record.clone();
        updated.touch();
        self.write(&updated)?;
        Ok(updated)
    }

    pub fn delete(&self, key: &str) -> DbResult<R> {
        let mut record = self.get(key)?;
        record.set_deleted_at(Some(Utc::now()));
        self.write(&record)?;
        Ok(record)
    }

    pub fn restore(&self, key: &str) -> DbResult<R> {
        let mut record = self.get_deleted(key)?;
        record.set_deleted_at(None);
        record.touch();
        self.write(&record)?;
        Ok(record)
    }

    pub fn purge(&self, key: &str) -> DbResult<()> {
        self.get_deleted(key)?;
        let mut table = self.txn.open_table(table_for::<R>())?;
        table.remove(key)?;
        Ok(())
    }

    fn read(&self, key: &str) -> DbResult<Option<R>> {
        let table = self.txn.open_table(table_for::<R>())?;
        let result = match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        };
        result
    }

    fn write(&self, record: &R) -> DbResult<()> {
        let key = record.db_key();
        let bytes = serde_json::to_vec(record)?;
        let mut table = self.txn.open_table(table_for::<R>())?;
        table.insert(key.as_str(), bytes.as_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;

    fn test_db() -> MetadataDb {
        let dir = env::temp_dir().join(format!("keymanager-db-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        MetadataDb::open(dir.join("metadata.redb")).unwrap()
    }

    fn account(store_id: &str, address: &str) -> EthAccountRecord {
        EthAccountRecord {
            address: address.to_string(),
            store_id: store_id.to_string(),
            key_id: "key-1".to_string(),
            public_key: vec![4; 65],
            compressed_public_key: vec![2; 33],
            tags: HashMap::new(),
            disabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn add_and_get_round_trip() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");
        db.add(&record).unwrap();

        let loaded = db.get(&record.db_key()).unwrap();
        assert_eq!(loaded.address, "0xabc");
        assert_eq!(loaded.key_id, "key-1");
    }

    #[test]
    fn add_duplicate_fails() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");
        db.add(&record).unwrap();
        assert!(matches!(db.add(&record), Err(DbError::AlreadyExists(_))));
    }

    #[test]
    fn same_address_in_two_stores_is_two_rows() {
        let db = test_db().eth_accounts();
        db.add(&account("s1", "0xabc")).unwrap();
        db.add(&account("s2", "0xabc")).unwrap();
        assert_eq!(db.get_all().unwrap().len(), 2);
    }

    #[test]
    fn soft_delete_cycle() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");
        let key = record.db_key();
        db.add(&record).unwrap();

        db.delete(&key).unwrap();

        // Live and deleted visibility are mutually exclusive.
        assert!(matches!(db.get(&key), Err(DbError::NotFound(_))));
        let deleted = db.get_deleted(&key).unwrap();
        assert!(deleted.deleted_at.is_some());

        db.restore(&key).unwrap();
        let restored = db.get(&key).unwrap();
        assert!(restored.deleted_at.is_none());
        assert_eq!(restored.address, record.address);
        assert_eq!(restored.key_id, record.key_id);
        assert_eq!(restored.public_key, record.public_key);
        assert!(matches!(db.get_deleted(&key), Err(DbError::NotFound(_))));
    }

    #[test]
    fn purge_requires_soft_deleted_row() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");
        let key = record.db_key();
        db.add(&record).unwrap();

        // Still live: purge refuses.
        assert!(matches!(db.purge(&key), Err(DbError::NotFound(_))));

        db.delete(&key).unwrap();
        db.purge(&key).unwrap();
        assert!(matches!(db.get_deleted(&key), Err(DbError::NotFound(_))));
    }

    #[test]
    fn delete_requires_live_row() {
        let db = test_db().eth_accounts();
        assert!(matches!(db.delete("s1|0xmissing"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn restore_requires_deleted_row() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");
        db.add(&record).unwrap();
        assert!(matches!(
            db.restore(&record.db_key()),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn update_bumps_updated_at() {
        let db = test_db().eth_accounts();
        let mut record = account("s1", "0xabc");
        db.add(&record).unwrap();

        let before = db.get(&record.db_key()).unwrap().updated_at;
        record
            .tags
            .insert("env".to_string(), "prod".to_string());
        let updated = db.update(&record).unwrap();

        assert!(updated.updated_at >= before);
        assert_eq!(
            db.get(&record.db_key()).unwrap().tags.get("env"),
            Some(&"prod".to_string())
        );
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");

        let result: DbResult<()> = db.run_in_transaction(|txn| {
            txn.add(&record)?;
            Err(DbError::NotFound("forced failure".to_string()))
        });
        assert!(result.is_err());

        // The insert inside the failed transaction must not be visible.
        assert!(matches!(db.get(&record.db_key()), Err(DbError::NotFound(_))));
    }

    #[test]
    fn explicit_txn_commit_and_abort() {
        let db = test_db().eth_accounts();
        let record = account("s1", "0xabc");

        let txn = db.begin().unwrap();
        txn.add(&record).unwrap();
        txn.commit().unwrap();
        assert!(db.get(&record.db_key()).is_ok());

        let txn = db.begin().unwrap();
        txn.delete(&record.db_key()).unwrap();
        txn.abort().unwrap();
        // Aborted delete leaves the row live.
        assert!(db.get(&record.db_key()).is_ok());
    }

    #[test]
    fn keys_and_secrets_tables_share_the_protocol() {
        let db = test_db();

        let keys = db.keys();
        let key_record = crate::database::models::KeyRecord {
            id: "k1".to_string(),
            store_id: "s1".to_string(),
            public_key: vec![2; 33],
            algorithm: crate::stores::entities::Algorithm::ecdsa_secp256k1(),
            tags: HashMap::new(),
            disabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        keys.add(&key_record).unwrap();
        keys.delete(&key_record.db_key()).unwrap();
        assert!(keys.get_deleted(&key_record.db_key()).is_ok());

        let secrets = db.secrets();
        let secret_record = crate::database::models::SecretRecord {
            id: "db-password".to_string(),
            store_id: "s1".to_string(),
            tags: HashMap::new(),
            disabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        secrets.add(&secret_record).unwrap();
        assert_eq!(secrets.get_all().unwrap().len(), 1);
    }
}
