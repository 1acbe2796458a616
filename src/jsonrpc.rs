// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC 2.0 envelope codec.
//!
//! Request/response types, the three-shape id (`string | number | null`),
//! batch bodies, and the error-code surface. Responses carry exactly one of
//! `result` or `error`. Notifications (requests without an id) produce no
//! response and are dropped from batch replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

pub const JSONRPC_VERSION: &str = "2.0";

// Standard protocol codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Request/response correlation id.
///
/// JSON-RPC 2.0 allows strings, numbers and null. An *absent* id marks a
/// notification and is modeled as `Option<RequestId>` on the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::Null
    }
}

/// A JSON-RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Notifications never receive a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Envelope-level validation: version tag and non-empty method.
    pub fn validate(&self) -> Result<(), ErrorObject> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(ErrorObject::invalid_request(format!(
                "unsupported jsonrpc version {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(ErrorObject::invalid_request("empty method".to_string()));
        }
        Ok(())
    }

    /// Bind one parameter: positionally when `params` is an array, by name
    /// when it is an object.
    pub fn param<T: serde::de::DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<T, ErrorObject> {
        let value = match &self.params {
            Some(Value::Array(items)) => items.get(index).cloned(),
            Some(Value::Object(map)) => map.get(name).cloned(),
            _ => None,
        };
        let value = value.ok_or_else(|| {
            ErrorObject::invalid_params(format!("missing parameter {name:?} (position {index})"))
        })?;
        serde_json::from_value(value)
            .map_err(|e| ErrorObject::invalid_params(format!("invalid parameter {name:?}: {e}")))
    }

    /// Bind the leading object parameter (transaction calls): the first
    /// array element, or the whole object in named form.
    pub fn object_param<T: serde::de::DeserializeOwned>(&self) -> Result<T, ErrorObject> {
        let value = match &self.params {
            Some(Value::Array(items)) => items.first().cloned(),
            Some(Value::Object(_)) => self.params.clone(),
            _ => None,
        };
        let value =
            value.ok_or_else(|| ErrorObject::invalid_params("missing parameters".to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| ErrorObject::invalid_params(format!("invalid parameters: {e}")))
    }
}

/// A JSON-RPC response envelope. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: RequestId,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method {method:?} not found"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<StoreError> for ErrorObject {
    fn from(err: StoreError) -> Self {
        Self::new(err.rpc_code(), err.to_string())
    }
}

/// A decoded request body: single call or batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcCall {
    Batch(Vec<Request>),
    Single(Request),
}

impl RpcCall {
    pub fn decode(body: &[u8]) -> Result<Self, ErrorObject> {
        serde_json::from_slice(body).map_err(|e| ErrorObject::parse_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trips_all_id_shapes() {
        for id in [
            json!(1),
            json!("req-7"),
            json!(null),
        ] {
            let body = json!({"jsonrpc": "2.0", "method": "eth_accounts", "id": id});
            let request: Request = serde_json::from_value(body.clone()).unwrap();
            assert!(!request.is_notification());
            let encoded = serde_json::to_value(&request).unwrap();
            assert_eq!(encoded, body);
        }
    }

    #[test]
    fn absent_id_is_a_notification() {
        let request: Request =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "eth_accounts"})).unwrap();
        assert!(request.is_notification());

        let request: Request = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "eth_accounts", "id": null}),
        )
        .unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(RequestId::Null));
    }

    #[test]
    fn response_round_trips() {
        let response = Response::success(RequestId::Number(3), json!("0x1"));
        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, response);
        // A success carries no error member at all.
        assert!(!encoded.contains("error"));
    }

    #[test]
    fn failure_carries_only_error() {
        let response = Response::failure(
            RequestId::String("a".to_string()),
            ErrorObject::method_not_found("eth_mine"),
        );
        let encoded = serde_json::to_value(&response).unwrap();
        assert!(encoded.get("result").is_none());
        assert_eq!(encoded["error"]["code"], -32601);
    }

    #[test]
    fn validate_rejects_wrong_version() {
        let request: Request =
            serde_json::from_value(json!({"jsonrpc": "1.0", "method": "m", "id": 1})).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn positional_and_named_params() {
        let positional: Request = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "eth_sign", "id": 1,
            "params": ["0xdbb881a51cd4023e4400cef3ef73046743f08da3", "0xa2"]
        }))
        .unwrap();
        let address: String = positional.param(0, "address").unwrap();
        let data: String = positional.param(1, "data").unwrap();
        assert_eq!(address, "0xdbb881a51cd4023e4400cef3ef73046743f08da3");
        assert_eq!(data, "0xa2");

        let named: Request = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "eth_sign", "id": 1,
            "params": {"address": "0xdbb881a51cd4023e4400cef3ef73046743f08da3", "data": "0xa2"}
        }))
        .unwrap();
        let address: String = named.param(0, "address").unwrap();
        assert_eq!(address, "0xdbb881a51cd4023e4400cef3ef73046743f08da3");

        let err = positional.param::<String>(2, "missing").unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn object_param_accepts_both_forms() {
        #[derive(Deserialize)]
        struct Tx {
            from: String,
        }

        let positional: Request = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "eth_sendTransaction", "id": 1,
            "params": [{"from": "0xabc"}]
        }))
        .unwrap();
        assert_eq!(positional.object_param::<Tx>().unwrap().from, "0xabc");

        let named: Request = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "eth_sendTransaction", "id": 1,
            "params": {"from": "0xabc"}
        }))
        .unwrap();
        assert_eq!(named.object_param::<Tx>().unwrap().from, "0xabc");
    }

    #[test]
    fn batch_decodes() {
        let body = serde_json::to_vec(&json!([
            {"jsonrpc": "2.0", "method": "eth_accounts", "id": 1},
            {"jsonrpc": "2.0", "method": "eth_blockNumber"}
        ]))
        .unwrap();

        match RpcCall::decode(&body).unwrap() {
            RpcCall::Batch(requests) => {
                assert_eq!(requests.len(), 2);
                assert!(requests[1].is_notification());
            }
            RpcCall::Single(_) => panic!("expected batch"),
        }
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = RpcCall::decode(b"{not json").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
    }

    #[test]
    fn store_errors_map_into_the_application_range() {
        let err: ErrorObject = StoreError::NotFound("account not found".to_string()).into();
        assert_eq!(err.code, -32000);
        let err: ErrorObject = StoreError::Forbidden("forbidden".to_string()).into();
        assert_eq!(err.code, -32000);
        let err: ErrorObject = StoreError::DependencyFailure("node down".to_string()).into();
        assert_eq!(err.code, -32010);
    }
}
