// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! REST surface for Ethereum accounts: `/stores/{storeName}/ethereum`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::database::EthAccountRecord;
use crate::error::ApiError;
use crate::state::AppState;
use crate::stores::ethereum::types::TransactionArgs;
use crate::stores::EthConnector;

/// Create or import an account. A present `private_key` imports it;
/// otherwise a new key is generated in the backing store.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEthAccountRequest {
    /// Identifier for the key inside the backing store.
    pub key_id: String,
    /// Hex-encoded secp256k1 private key to import (optional).
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub private_key: Option<alloy::primitives::Bytes>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEthAccountRequest {
    pub tags: HashMap<String, String>,
}

/// Sign an arbitrary payload with the EIP-191 prefix.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignMessageRequest {
    /// Hex-encoded payload.
    #[schema(value_type = String)]
    pub data: alloy::primitives::Bytes,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignatureResponse {
    /// 0x-prefixed hex signature.
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RawTransactionResponse {
    /// 0x-prefixed signed RLP payload.
    pub raw: String,
}

/// Account representation returned to API clients. Never includes private
/// key material — only the backing store holds it.
#[derive(Debug, Serialize, ToSchema)]
pub struct EthAccountResponse {
    pub address: String,
    pub key_id: String,
    /// Uncompressed public key, hex.
    pub public_key: String,
    /// Compressed public key, hex.
    pub compressed_public_key: String,
    pub tags: HashMap<String, String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<EthAccountRecord> for EthAccountResponse {
    fn from(record: EthAccountRecord) -> Self {
        Self {
            address: record.address,
            key_id: record.key_id,
            public_key: format!("0x{}", alloy::hex::encode(&record.public_key)),
            compressed_public_key: format!(
                "0x{}",
                alloy::hex::encode(&record.compressed_public_key)
            ),
            tags: record.tags,
            disabled: record.disabled,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub deleted: bool,
}

fn connector(state: &AppState, store_name: &str) -> Result<Arc<EthConnector>, ApiError> {
    state
        .registry
        .store(store_name)
        .ok_or_else(|| ApiError::not_found(format!("store {store_name:?} not found")))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw).map_err(|_| ApiError::bad_request(format!("invalid address {raw:?}")))
}

/// Create or import an Ethereum account.
#[utoipa::path(
    post,
    path = "/stores/{storeName}/ethereum",
    tag = "Ethereum",
    params(("storeName" = String, Path, description = "Target store")),
    request_body = CreateEthAccountRequest,
    responses(
        (status = 200, description = "Account registered", body = EthAccountResponse),
        (status = 403, description = "Caller lacks write permission"),
        (status = 409, description = "Account already exists")
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    Path(store_name): Path<String>,
    Auth(user): Auth,
    Json(body): Json<CreateEthAccountRequest>,
) -> Result<Json<EthAccountResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let record = match &body.private_key {
        Some(private_key) => {
            connector
                .import(&user, &body.key_id, private_key, body.tags)
                .await?
        }
        None => connector.create(&user, &body.key_id, body.tags).await?,
    };
    Ok(Json(record.into()))
}

/// List accounts; `?deleted=true` lists the soft-deleted ones.
#[utoipa::path(
    get,
    path = "/stores/{storeName}/ethereum",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("deleted" = Option<bool>, Query, description = "List soft-deleted accounts instead")
    ),
    responses((status = 200, description = "Accounts", body = [EthAccountResponse]))
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    Path(store_name): Path<String>,
    Query(query): Query<ListQuery>,
    Auth(user): Auth,
) -> Result<Json<Vec<EthAccountResponse>>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let records = if query.deleted {
        connector.list_deleted(&user)?
    } else {
        connector.list(&user)?
    };
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Fetch one live account.
#[utoipa::path(
    get,
    path = "/stores/{storeName}/ethereum/{address}",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses(
        (status = 200, description = "Account", body = EthAccountResponse),
        (status = 404, description = "No live account at this address")
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
) -> Result<Json<EthAccountResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    Ok(Json(connector.get(&user, &address)?.into()))
}

/// Update an account's tags.
#[utoipa::path(
    put,
    path = "/stores/{storeName}/ethereum/{address}",
    tag = "Ethereum",
    request_body = UpdateEthAccountRequest,
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 200, description = "Updated account", body = EthAccountResponse))
)]
pub async fn update_account(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
    Json(body): Json<UpdateEthAccountRequest>,
) -> Result<Json<EthAccountResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    Ok(Json(connector.update(&user, &address, body.tags)?.into()))
}

/// Soft-delete an account.
#[utoipa::path(
    delete,
    path = "/stores/{storeName}/ethereum/{address}",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 204, description = "Account soft-deleted"))
)]
pub async fn delete_account(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
) -> Result<axum::http::StatusCode, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    connector.delete(&user, &address).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted account.
#[utoipa::path(
    put,
    path = "/stores/{storeName}/ethereum/{address}/restore",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 204, description = "Account restored"))
)]
pub async fn restore_account(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
) -> Result<axum::http::StatusCode, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    connector.restore(&user, &address).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Permanently destroy a soft-deleted account.
#[utoipa::path(
    delete,
    path = "/stores/{storeName}/ethereum/{address}/destroy",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 204, description = "Account destroyed"))
)]
pub async fn destroy_account(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
) -> Result<axum::http::StatusCode, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    connector.destroy(&user, &address).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Sign an arbitrary payload (EIP-191 prefixed).
#[utoipa::path(
    post,
    path = "/stores/{storeName}/ethereum/{address}/sign",
    tag = "Ethereum",
    request_body = SignMessageRequest,
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses(
        (status = 200, description = "65-byte signature", body = SignatureResponse),
        (status = 403, description = "Caller lacks sign permission")
    )
)]
pub async fn sign_message(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
    Json(body): Json<SignMessageRequest>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    let signature = connector.sign_message(&user, &address, &body.data).await?;
    Ok(Json(SignatureResponse {
        signature: format!("0x{}", alloy::hex::encode(signature)),
    }))
}

/// Sign a transaction; returns the raw payload for `eth_sendRawTransaction`.
#[utoipa::path(
    post,
    path = "/stores/{storeName}/ethereum/{address}/sign-transaction",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 200, description = "Signed RLP payload", body = RawTransactionResponse))
)]
pub async fn sign_transaction(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
    Json(args): Json<TransactionArgs>,
) -> Result<Json<RawTransactionResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    let raw = connector.sign_transaction(&user, &address, &args).await?;
    Ok(Json(RawTransactionResponse {
        raw: format!("0x{}", alloy::hex::encode(raw)),
    }))
}

/// Sign EIP-712 typed data.
#[utoipa::path(
    post,
    path = "/stores/{storeName}/ethereum/{address}/sign-typed-data",
    tag = "Ethereum",
    params(
        ("storeName" = String, Path, description = "Target store"),
        ("address" = String, Path, description = "Account address")
    ),
    responses((status = 200, description = "65-byte signature", body = SignatureResponse))
)]
pub async fn sign_typed_data(
    State(state): State<AppState>,
    Path((store_name, address)): Path<(String, String)>,
    Auth(user): Auth,
    Json(typed_data): Json<serde_json::Value>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let connector = connector(&state, &store_name)?;
    let address = parse_address(&address)?;
    let signature = connector
        .sign_typed_data(&user, &address, &typed_data)
        .await?;
    Ok(Json(SignatureResponse {
        signature: format!("0x{}", alloy::hex::encode(signature)),
    }))
}
