// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC method interception.
//!
//! Account-operation methods are answered locally with held keys; the
//! write-path variants are translated into their raw-send counterparts and
//! re-injected downstream. Parameters bind positionally when `params` is an
//! array and by name when it is an object. `personal_sign` follows the
//! de-facto reversed order `(data, address)`.

use alloy::primitives::{Address, Bytes, U256, U64};
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::proxy::NodeProxy;
use crate::auth::UserInfo;
use crate::error::StoreError;
use crate::jsonrpc::{ErrorObject, Request, Response, RpcCall};
use crate::stores::ethereum::types::TransactionArgs;
use crate::stores::EthConnector;

/// Methods handled locally instead of forwarded.
const INTERCEPT_SET: [&str; 8] = [
    "eth_accounts",
    "eth_sign",
    "personal_sign",
    "eth_signTransaction",
    "eth_sendTransaction",
    "eea_sendTransaction",
    "eth_signTypedData",
    "eth_signTypedData_v4",
];

pub fn intercepts(method: &str) -> bool {
    INTERCEPT_SET.contains(&method)
}

/// How a decoded JSON-RPC body was handled.
pub enum RpcOutcome {
    /// Handled locally; the JSON body to return (`None` when the body held
    /// only notifications).
    Handled(Option<Value>),
    /// Nothing in the body is intercepted: forward the original bytes
    /// transparently.
    Forward,
}

fn hex_value(bytes: &[u8]) -> Value {
    Value::String(format!("0x{}", alloy::hex::encode(bytes)))
}

impl NodeProxy {
    /// Process a decoded body: single or batch, intercepted or not.
    ///
    /// A batch with any intercepted entry is taken apart and processed
    /// request by request — intercepted entries locally, the rest re-issued
    /// downstream individually — preserving request order and omitting
    /// notifications from the reply.
    pub async fn process(&self, user: &UserInfo, call: RpcCall) -> RpcOutcome {
        match call {
            RpcCall::Single(request) => {
                if !intercepts(&request.method) {
                    return RpcOutcome::Forward;
                }
                let response = self.handle_request(user, request).await;
                RpcOutcome::Handled(
                    response.map(|r| serde_json::to_value(r).expect("response serializes")),
                )
            }
            RpcCall::Batch(requests) => {
                if !requests.iter().any(|r| intercepts(&r.method)) {
                    return RpcOutcome::Forward;
                }
                let mut responses = Vec::new();
                for request in requests {
                    let response = if intercepts(&request.method) {
                        self.handle_request(user, request).await
                    } else {
                        self.forward_single(request).await
                    };
                    if let Some(response) = response {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    RpcOutcome::Handled(None)
                } else {
                    RpcOutcome::Handled(Some(
                        serde_json::to_value(responses).expect("responses serialize"),
                    ))
                }
            }
        }
    }

    /// Re-issue a non-intercepted batch entry downstream on its own.
    async fn forward_single(&self, request: Request) -> Option<Response> {
        let id = request.id.clone();
        let result = self
            .call(&request.method, request.params.unwrap_or_else(|| json!([])))
            .await;
        let id = id?;
        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(error) => Response::failure(id, error),
        })
    }

    /// Answer one intercepted request. Returns `None` for notifications,
    /// which receive no response by protocol.
    pub async fn handle_request(&self, user: &UserInfo, request: Request) -> Option<Response> {
        let id = request.id.clone();
        let outcome = self.dispatch(user, &request).await;
        let id = id?;
        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        })
    }

    async fn dispatch(&self, user: &UserInfo, request: &Request) -> Result<Value, ErrorObject> {
        request.validate()?;
        debug!(node = %self.name(), method = %request.method, user = %user.username, "intercepting");

        match request.method.as_str() {
            "eth_accounts" => self.eth_accounts(user).await,
            "eth_sign" => {
                let address: Address = request.param(0, "address")?;
                let data: Bytes = request.param(1, "data")?;
                self.sign_message(user, &address, &data).await
            }
            "personal_sign" => {
                // Reversed by convention: (data, address).
                let data: Bytes = request.param(0, "data")?;
                let address: Address = request.param(1, "address")?;
                self.sign_message(user, &address, &data).await
            }
            "eth_signTransaction" => {
                let mut args: TransactionArgs = request.object_param()?;
                let (connector, from) = self.resolve_sender(user, &args)?;
                self.fill_transaction(&mut args).await?;
                let raw = connector.sign_transaction(user, &from, &args).await?;
                Ok(hex_value(&raw))
            }
            "eth_sendTransaction" => {
                let args: TransactionArgs = request.object_param()?;
                if args.is_private() {
                    self.send_quorum_private(user, args).await
                } else {
                    self.send_public(user, args).await
                }
            }
            "eea_sendTransaction" => {
                let args: TransactionArgs = request.object_param()?;
                self.send_eea_private(user, args).await
            }
            "eth_signTypedData" | "eth_signTypedData_v4" => {
                let address: Address = request.param(0, "address")?;
                let typed_data: Value = request.param(1, "typedData")?;
                let (connector, _) = self.resolve_address(user, &address)?;
                let signature = connector.sign_typed_data(user, &address, &typed_data).await?;
                Ok(hex_value(&signature))
            }
            other => Err(ErrorObject::method_not_found(other)),
        }
    }

    /// Union of live account addresses across the node's mapped stores.
    /// Stores the caller may not read are skipped rather than failing the
    /// whole listing.
    async fn eth_accounts(&self, user: &UserInfo) -> Result<Value, ErrorObject> {
        let mut addresses: Vec<String> = Vec::new();
        for connector in self.stores() {
            match connector.list(user) {
                Ok(records) => addresses.extend(records.into_iter().map(|r| r.address)),
                Err(StoreError::Forbidden(_)) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        addresses.sort();
        addresses.dedup();
        Ok(json!(addresses))
    }

    async fn sign_message(
        &self,
        user: &UserInfo,
        address: &Address,
        data: &[u8],
    ) -> Result<Value, ErrorObject> {
        let (connector, _) = self.resolve_address(user, address)?;
        let signature = connector.sign_message(user, address, data).await?;
        Ok(hex_value(&signature))
    }

    async fn send_public(
        &self,
        user: &UserInfo,
        mut args: TransactionArgs,
    ) -> Result<Value, ErrorObject> {
        let (connector, from) = self.resolve_sender(user, &args)?;
        self.fill_transaction(&mut args).await?;
        let raw = connector.sign_transaction(user, &from, &args).await?;
        self.send_raw("eth_sendRawTransaction", &raw, None).await
    }

    /// Quorum private path: push the payload through the Tessera-compatible
    /// companion, sign over the returned payload hash with v ∈ {37, 38},
    /// re-inject as a raw private send.
    async fn send_quorum_private(
        &self,
        user: &UserInfo,
        mut args: TransactionArgs,
    ) -> Result<Value, ErrorObject> {
        let (connector, from) = self.resolve_sender(user, &args)?;
        self.fill_private_fields(&mut args).await?;

        let payload = args.calldata();
        let payload_hash = self
            .store_raw_payload(&payload, args.private_from.as_deref())
            .await?;
        args.input = Some(payload_hash);
        args.data = None;

        let raw = connector.sign_private_transaction(user, &from, &args).await?;
        let privacy = json!({ "privateFor": args.private_for });
        self.send_raw("eth_sendRawPrivateTransaction", &raw, Some(privacy))
            .await
    }

    async fn send_eea_private(
        &self,
        user: &UserInfo,
        mut args: TransactionArgs,
    ) -> Result<Value, ErrorObject> {
        let (connector, from) = self.resolve_sender(user, &args)?;
        self.fill_private_fields(&mut args).await?;
        if args.chain_id.is_none() {
            args.chain_id = Some(U64::from(self.chain_id().await?));
        }

        let raw = connector.sign_eea_transaction(user, &from, &args).await?;
        self.send_raw("eea_sendRawTransaction", &raw, None).await
    }

    fn resolve_sender(
        &self,
        user: &UserInfo,
        args: &TransactionArgs,
    ) -> Result<(std::sync::Arc<EthConnector>, Address), ErrorObject> {
        let from = args.from_address()?;
        let (connector, _) = self.resolve_address(user, &from)?;
        Ok((connector, from))
    }

    /// Look an address up across the mapped stores, in precedence order.
    fn resolve_address(
        &self,
        user: &UserInfo,
        address: &Address,
    ) -> Result<(std::sync::Arc<EthConnector>, crate::database::EthAccountRecord), ErrorObject>
    {
        for connector in self.stores() {
            match connector.get(user, address) {
                Ok(record) => return Ok((std::sync::Arc::clone(connector), record)),
                Err(StoreError::NotFound(_)) => continue,
                Err(StoreError::Forbidden(_)) => {
                    return Err(ErrorObject::new(-32000, "forbidden"))
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(ErrorObject::new(-32000, "account not found"))
    }

    /// Pre-fill missing public-transaction fields with downstream probes.
    async fn fill_transaction(&self, args: &mut TransactionArgs) -> Result<(), ErrorObject> {
        let from = args.from_address()?;

        if args.nonce.is_none() {
            let nonce = self
                .call("eth_getTransactionCount", json!([from, "pending"]))
                .await?;
            args.nonce = Some(quantity::<U64>(&nonce, "eth_getTransactionCount")?);
        }

        if args.chain_id.is_none() {
            args.chain_id = Some(U64::from(self.chain_id().await?));
        }

        let dynamic_fee =
            args.max_fee_per_gas.is_some() || args.max_priority_fee_per_gas.is_some();
        if !dynamic_fee && args.gas_price.is_none() {
            let price = self.call("eth_gasPrice", json!([])).await?;
            args.gas_price = Some(quantity::<U256>(&price, "eth_gasPrice")?);
        }

        if args.gas.is_none() {
            let call = json!([{
                "from": from,
                "to": args.to,
                "value": args.value,
                "data": args.calldata(),
            }]);
            let gas = self.call("eth_estimateGas", call).await?;
            args.gas = Some(quantity::<U64>(&gas, "eth_estimateGas")?);
        }

        Ok(())
    }

    /// Private transactions still need nonce and gas price; gas estimation
    /// cannot see the private payload, so the caller must provide the limit.
    async fn fill_private_fields(&self, args: &mut TransactionArgs) -> Result<(), ErrorObject> {
        let from = args.from_address()?;

        if args.nonce.is_none() {
            let nonce = self
                .call("eth_getTransactionCount", json!([from, "pending"]))
                .await?;
            args.nonce = Some(quantity::<U64>(&nonce, "eth_getTransactionCount")?);
        }
        if args.gas_price.is_none() {
            let price = self.call("eth_gasPrice", json!([])).await?;
            args.gas_price = Some(quantity::<U256>(&price, "eth_gasPrice")?);
        }
        if args.gas.is_none() {
            return Err(ErrorObject::invalid_params(
                "private transactions require an explicit \"gas\" field",
            ));
        }
        Ok(())
    }

    /// `POST {privacyManager}/storeraw`: exchange the encrypted payload for
    /// its enclave hash, which becomes the on-chain calldata.
    async fn store_raw_payload(
        &self,
        payload: &[u8],
        private_from: Option<&str>,
    ) -> Result<Bytes, ErrorObject> {
        let base = self.specs().privacy_manager_url.clone().ok_or_else(|| {
            ErrorObject::from(StoreError::Config(format!(
                "node {:?} has no privacy manager configured",
                self.name()
            )))
        })?;

        let b64 = base64::engine::general_purpose::STANDARD;
        let mut body = json!({ "payload": b64.encode(payload) });
        if let Some(from) = private_from {
            body["from"] = Value::String(from.to_string());
        }

        let url = format!("{}/storeraw", base.trim_end_matches('/'));
        let response = self
            .http()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ErrorObject::from(StoreError::DependencyFailure(format!(
                    "privacy manager unreachable: {e}"
                )))
            })?;

        if !response.status().is_success() {
            return Err(ErrorObject::from(StoreError::DependencyFailure(format!(
                "privacy manager returned HTTP {}",
                response.status()
            ))));
        }

        #[derive(serde::Deserialize)]
        struct StoreRawResponse {
            key: String,
        }
        let parsed: StoreRawResponse = response.json().await.map_err(|_| {
            ErrorObject::from(StoreError::DependencyFailure(
                "privacy manager returned a malformed response".to_string(),
            ))
        })?;

        let key = b64.decode(parsed.key).map_err(|_| {
            ErrorObject::from(StoreError::DependencyFailure(
                "privacy manager key is not valid base64".to_string(),
            ))
        })?;
        Ok(Bytes::from(key))
    }
}

fn quantity<T: serde::de::DeserializeOwned>(
    value: &Value,
    probe: &str,
) -> Result<T, ErrorObject> {
    serde_json::from_value(value.clone())
        .map_err(|_| ErrorObject::internal(format!("{probe} returned an invalid quantity")))
}
