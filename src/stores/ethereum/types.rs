// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction argument binding.
//!
//! [`TransactionArgs`] is the wire shape shared by the REST
//! `sign-transaction` endpoint and the JSON-RPC interceptor: every field the
//! `eth_sendTransaction` family accepts, quantities in 0x-hex, plus the
//! Quorum/EEA privacy extensions.

use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bytes, TxKind, U256, U64};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{StoreError, StoreResult};

/// Privacy restriction marker carried by EEA transactions.
pub const RESTRICTION_RESTRICTED: &str = "restricted";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionArgs {
    #[schema(value_type = Option<String>)]
    pub from: Option<Address>,
    #[schema(value_type = Option<String>)]
    pub to: Option<Address>,
    #[schema(value_type = Option<String>)]
    pub gas: Option<U64>,
    #[schema(value_type = Option<String>)]
    pub gas_price: Option<U256>,
    #[schema(value_type = Option<String>)]
    pub max_fee_per_gas: Option<U256>,
    #[schema(value_type = Option<String>)]
    pub max_priority_fee_per_gas: Option<U256>,
    #[schema(value_type = Option<String>)]
    pub value: Option<U256>,
    #[schema(value_type = Option<String>)]
    pub nonce: Option<U64>,
    #[schema(value_type = Option<String>)]
    pub data: Option<Bytes>,
    /// Alias for `data`; `input` wins when both are set.
    #[schema(value_type = Option<String>)]
    pub input: Option<Bytes>,
    #[schema(value_type = Option<String>)]
    pub chain_id: Option<U64>,
    #[schema(value_type = Option<Vec<String>>)]
    pub access_list: Option<AccessList>,
    // Quorum / EEA privacy fields (base64-encoded enclave keys).
    pub private_from: Option<String>,
    pub private_for: Option<Vec<String>>,
    pub privacy_group_id: Option<String>,
    pub restriction: Option<String>,
}

impl TransactionArgs {
    /// The sender, required for every signing operation.
    pub fn from_address(&self) -> StoreResult<Address> {
        self.from
            .ok_or_else(|| StoreError::InvalidParameter("missing \"from\" field".to_string()))
    }

    /// Effective calldata: `input` preferred over `data`.
    pub fn calldata(&self) -> Bytes {
        self.input
            .clone()
            .or_else(|| self.data.clone())
            .unwrap_or_default()
    }

    /// `to` as a transaction kind; absent means contract creation.
    pub fn tx_kind(&self) -> TxKind {
        match self.to {
            Some(address) => TxKind::Call(address),
            None => TxKind::Create,
        }
    }

    /// Chain id with the pre-EIP-155 convention: absent or zero means none.
    pub fn effective_chain_id(&self) -> Option<u64> {
        self.chain_id.map(|id| id.to::<u64>()).filter(|id| *id != 0)
    }

    /// A transaction is Quorum-private when it names recipients enclaves.
    pub fn is_private(&self) -> bool {
        self.private_for.as_ref().is_some_and(|p| !p.is_empty())
            || self.privacy_group_id.is_some()
    }

    pub fn nonce(&self) -> StoreResult<u64> {
        self.nonce
            .map(|n| n.to::<u64>())
            .ok_or_else(|| StoreError::InvalidParameter("missing \"nonce\" field".to_string()))
    }

    pub fn gas_limit(&self) -> StoreResult<u64> {
        self.gas
            .map(|g| g.to::<u64>())
            .ok_or_else(|| StoreError::InvalidParameter("missing \"gas\" field".to_string()))
    }

    pub fn gas_price(&self) -> StoreResult<u128> {
        self.gas_price
            .map(|p| p.to::<u128>())
            .ok_or_else(|| StoreError::InvalidParameter("missing \"gasPrice\" field".to_string()))
    }
}
