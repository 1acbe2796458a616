// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ethereum signing primitives for the connector.
//!
//! Backends hand back a bare 64-byte `r ‖ s`; everything Ethereum-specific
//! happens here: low-s normalization, recovery-id computation by trial
//! recovery against the account's public key, transaction digests and signed
//! envelope assembly for legacy / EIP-2930 / EIP-1559 shapes, and the two
//! private-transaction encodings (Quorum, EEA) that the standard envelope
//! types cannot express.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEip2930, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy::rlp::{Encodable, Header};
use base64::Engine;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};

use super::types::{TransactionArgs, RESTRICTION_RESTRICTED};
use crate::error::{StoreError, StoreResult};

/// secp256k1 group order, used to assert the low-s invariant in tests.
#[cfg(test)]
pub(crate) const SECP256K1_ORDER: &str =
    "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

/// A normalized signature with its recovery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: U256,
    pub s: U256,
    /// 0 or 1.
    pub recovery_id: u8,
}

impl SignatureParts {
    /// 65-byte `r ‖ s ‖ v` with v ∈ {27, 28}, the `eth_sign` wire form.
    pub fn to_eth_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = 27 + self.recovery_id;
        out
    }

    fn to_alloy(self) -> Signature {
        Signature::new(self.r, self.s, self.recovery_id == 1)
    }
}

/// Derive the account address from a 65-byte uncompressed public key.
pub fn address_from_public_key(public_key: &[u8]) -> StoreResult<Address> {
    if public_key.len() != 65 || public_key[0] != 0x04 {
        return Err(StoreError::InvalidFormat(
            "public key must be 65 bytes, uncompressed".to_string(),
        ));
    }
    let hash = keccak256(&public_key[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Expand any SEC1 public key encoding into (uncompressed, compressed).
pub fn public_key_encodings(sec1: &[u8]) -> StoreResult<(Vec<u8>, Vec<u8>)> {
    let verifying_key = VerifyingKey::from_sec1_bytes(sec1)
        .map_err(|_| StoreError::InvalidFormat("invalid secp256k1 public key".to_string()))?;
    Ok((
        verifying_key.to_encoded_point(false).as_bytes().to_vec(),
        verifying_key.to_encoded_point(true).as_bytes().to_vec(),
    ))
}

/// The `eth_sign` / `personal_sign` digest:
/// `keccak256("\x19Ethereum Signed Message:\n" ‖ len(data) ‖ data)`.
pub fn eip191_digest(data: &[u8]) -> B256 {
    let mut message = format!("\x19Ethereum Signed Message:\n{}", data.len()).into_bytes();
    message.extend_from_slice(data);
    keccak256(&message)
}

/// Normalize a backend signature and recover its recovery id.
///
/// Backends are not trusted to produce low-s signatures, so the s half is
/// normalized first. The recovery id is then found by trying both candidates
/// and keeping the one that recovers the account's public key.
pub fn finalize_signature(
    raw: &[u8],
    digest: &B256,
    public_key: &[u8],
) -> StoreResult<SignatureParts> {
    let signature = EcdsaSignature::from_slice(raw)
        .map_err(|_| StoreError::InvalidFormat("backend signature is not a 64-byte r‖s".to_string()))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let expected = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| StoreError::InvalidFormat("invalid account public key".to_string()))?;

    for candidate in [0u8, 1u8] {
        let recovery_id = RecoveryId::from_byte(candidate)
            .ok_or_else(|| StoreError::Internal("invalid recovery id candidate".to_string()))?;
        if let Ok(recovered) =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        {
            if recovered == expected {
                let bytes = signature.to_bytes();
                return Ok(SignatureParts {
                    r: U256::from_be_slice(&bytes[..32]),
                    s: U256::from_be_slice(&bytes[32..]),
                    recovery_id: candidate,
                });
            }
        }
    }

    Err(StoreError::Internal(
        "signature does not recover to the account public key".to_string(),
    ))
}

/// Legacy `v` encoding: 27|28 pre-EIP-155, `{0|1} + 2·chainID + 35` after.
pub fn legacy_v(chain_id: Option<u64>, recovery_id: u8) -> u64 {
    match chain_id {
        None => 27 + recovery_id as u64,
        Some(id) => 35 + 2 * id + recovery_id as u64,
    }
}

/// Quorum private `v`: 37|38.
pub fn quorum_v(recovery_id: u8) -> u64 {
    37 + recovery_id as u64
}

/// A transaction bound to one of the three supported envelope shapes.
#[derive(Debug, Clone)]
pub enum PreparedTx {
    Legacy(TxLegacy),
    Eip2930(TxEip2930),
    Eip1559(TxEip1559),
}

impl PreparedTx {
    /// Choose the envelope shape from the supplied fields.
    ///
    /// Dynamic-fee fields select EIP-1559, an access list alone selects
    /// EIP-2930, anything else is a legacy transaction. The typed shapes
    /// require a chain id; legacy treats a missing or zero chain id as
    /// pre-EIP-155.
    pub fn build(args: &TransactionArgs) -> StoreResult<Self> {
        let chain_id = args.effective_chain_id();
        let nonce = args.nonce()?;
        let gas_limit = args.gas_limit()?;
        let value = args.value.unwrap_or_default();
        let input = args.calldata();
        let to = args.tx_kind();

        if args.max_fee_per_gas.is_some() || args.max_priority_fee_per_gas.is_some() {
            let chain_id = chain_id.ok_or_else(|| {
                StoreError::InvalidParameter(
                    "dynamic-fee transactions require a chain id".to_string(),
                )
            })?;
            return Ok(PreparedTx::Eip1559(TxEip1559 {
                chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: args
                    .max_fee_per_gas
                    .map(|f| f.to::<u128>())
                    .unwrap_or_default(),
                max_priority_fee_per_gas: args
                    .max_priority_fee_per_gas
                    .map(|f| f.to::<u128>())
                    .unwrap_or_default(),
                to,
                value,
                access_list: args.access_list.clone().unwrap_or_default(),
                input,
            }));
        }

        if let Some(access_list) = &args.access_list {
            let chain_id = chain_id.ok_or_else(|| {
                StoreError::InvalidParameter(
                    "access-list transactions require a chain id".to_string(),
                )
            })?;
            return Ok(PreparedTx::Eip2930(TxEip2930 {
                chain_id,
                nonce,
                gas_price: args.gas_price()?,
                gas_limit,
                to,
                value,
                access_list: access_list.clone(),
                input,
            }));
        }

        Ok(PreparedTx::Legacy(TxLegacy {
            chain_id,
            nonce,
            gas_price: args.gas_price()?,
            gas_limit,
            to,
            value,
            input,
        }))
    }

    /// The digest the backend signs.
    pub fn signature_hash(&self) -> B256 {
        match self {
            PreparedTx::Legacy(tx) => tx.signature_hash(),
            PreparedTx::Eip2930(tx) => tx.signature_hash(),
            PreparedTx::Eip1559(tx) => tx.signature_hash(),
        }
    }

    /// Assemble the signed raw payload for `eth_sendRawTransaction`.
    pub fn into_raw(self, parts: SignatureParts) -> Vec<u8> {
        let signature = parts.to_alloy();
        let envelope = match self {
            PreparedTx::Legacy(tx) => TxEnvelope::Legacy(tx.into_signed(signature)),
            PreparedTx::Eip2930(tx) => TxEnvelope::Eip2930(tx.into_signed(signature)),
            PreparedTx::Eip1559(tx) => TxEnvelope::Eip1559(tx.into_signed(signature)),
        };
        let mut raw = Vec::new();
        envelope.encode_2718(&mut raw);
        raw
    }
}

fn rlp_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

fn encode_tx_kind(kind: &alloy::primitives::TxKind, out: &mut Vec<u8>) {
    match kind {
        alloy::primitives::TxKind::Call(address) => address.encode(out),
        alloy::primitives::TxKind::Create => Bytes::new().encode(out),
    }
}

fn encode_legacy_body(tx: &TxLegacy, out: &mut Vec<u8>) {
    tx.nonce.encode(out);
    tx.gas_price.encode(out);
    tx.gas_limit.encode(out);
    encode_tx_kind(&tx.to, out);
    tx.value.encode(out);
    tx.input.encode(out);
}

/// Signed Quorum private transaction: the legacy nine-field list with
/// v ∈ {37, 38}. The digest is the homestead legacy hash (no chain id).
pub fn encode_quorum_private(tx: &TxLegacy, parts: &SignatureParts) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_legacy_body(tx, &mut payload);
    quorum_v(parts.recovery_id).encode(&mut payload);
    parts.r.encode(&mut payload);
    parts.s.encode(&mut payload);
    rlp_list(payload)
}

/// Recipients of an EEA private transaction: enclave list or privacy group.
#[derive(Debug, Clone)]
pub enum EeaRecipients {
    PrivateFor(Vec<Bytes>),
    PrivacyGroupId(Bytes),
}

/// Privacy metadata of an EEA private transaction.
#[derive(Debug, Clone)]
pub struct EeaPrivacy {
    pub private_from: Bytes,
    pub recipients: EeaRecipients,
    pub restriction: String,
}

impl EeaPrivacy {
    /// Decode the base64 enclave keys out of the bound arguments.
    pub fn from_args(args: &TransactionArgs) -> StoreResult<Self> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let decode = |value: &str, field: &str| -> StoreResult<Bytes> {
            b64.decode(value)
                .map(Bytes::from)
                .map_err(|_| StoreError::InvalidParameter(format!("{field} is not valid base64")))
        };

        let private_from = args
            .private_from
            .as_deref()
            .ok_or_else(|| StoreError::InvalidParameter("missing \"privateFrom\" field".to_string()))?;
        let private_from = decode(private_from, "privateFrom")?;

        let recipients = match (&args.private_for, &args.privacy_group_id) {
            (Some(enclaves), None) if !enclaves.is_empty() => EeaRecipients::PrivateFor(
                enclaves
                    .iter()
                    .map(|e| decode(e, "privateFor"))
                    .collect::<StoreResult<Vec<_>>>()?,
            ),
            (None, Some(group)) => EeaRecipients::PrivacyGroupId(decode(group, "privacyGroupId")?),
            _ => {
                return Err(StoreError::InvalidParameter(
                    "exactly one of \"privateFor\" or \"privacyGroupId\" is required".to_string(),
                ))
            }
        };

        Ok(Self {
            private_from,
            recipients,
            restriction: args
                .restriction
                .clone()
                .unwrap_or_else(|| RESTRICTION_RESTRICTED.to_string()),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.private_from.encode(out);
        match &self.recipients {
            EeaRecipients::PrivateFor(enclaves) => {
                let inner: usize = enclaves.iter().map(|e| e.length()).sum();
                Header {
                    list: true,
                    payload_length: inner,
                }
                .encode(out);
                for enclave in enclaves {
                    enclave.encode(out);
                }
            }
            EeaRecipients::PrivacyGroupId(group) => group.encode(out),
        }
        Bytes::from(self.restriction.clone().into_bytes()).encode(out);
    }
}

/// EEA signing digest: the legacy fields extended with the EIP-155 triplet
/// (when a chain id is present) and the privacy fields.
pub fn eea_signature_hash(tx: &TxLegacy, privacy: &EeaPrivacy) -> B256 {
    let mut payload = Vec::new();
    encode_legacy_body(tx, &mut payload);
    if let Some(chain_id) = tx.chain_id {
        chain_id.encode(&mut payload);
        0u64.encode(&mut payload);
        0u64.encode(&mut payload);
    }
    privacy.encode(&mut payload);
    keccak256(rlp_list(payload))
}

/// Signed EEA private transaction: twelve-field list ending in the privacy
/// fields, v EIP-155-encoded when a chain id is present.
pub fn encode_eea_private(tx: &TxLegacy, privacy: &EeaPrivacy, parts: &SignatureParts) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_legacy_body(tx, &mut payload);
    legacy_v(tx.chain_id, parts.recovery_id).encode(&mut payload);
    parts.r.encode(&mut payload);
    parts.s.encode(&mut payload);
    privacy.encode(&mut payload);
    rlp_list(payload)
}
