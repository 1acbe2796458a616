// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Downstream transport for one registered node.
//!
//! Owns the keep-alive HTTP connection pool to the node, the per-node chain
//! id cache, the token bucket guarding the downstream, and the transparent
//! pass-through path with RFC 7230 hop-by-hop header stripping.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Response as HttpResponse, StatusCode};
use bytes::Bytes;
use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::rate_limit::RateLimiter;
use crate::jsonrpc::{ErrorObject, Request, RequestId, Response};
use crate::manifests::NodeSpecs;
use crate::stores::EthConnector;

/// Stable message for downstream transport failures.
const DOWNSTREAM_UNREACHABLE: &str = "downstream node unreachable";

/// Headers that never cross a proxy hop (RFC 7230 §6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut named: Vec<String> = Vec::new();
    for value in headers.get_all("connection") {
        if let Ok(value) = value.to_str() {
            named.extend(value.split(',').map(|t| t.trim().to_ascii_lowercase()));
        }
    }

    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) || named.contains(&lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Reverse proxy to one downstream node, plus the Ethereum stores mapped to
/// it in precedence order.
pub struct NodeProxy {
    name: String,
    specs: NodeSpecs,
    stores: Vec<Arc<EthConnector>>,
    client: reqwest::Client,
    chain_id: RwLock<Option<u64>>,
    limiter: RateLimiter,
}

impl NodeProxy {
    pub fn new(
        name: impl Into<String>,
        specs: NodeSpecs,
        stores: Vec<Arc<EthConnector>>,
    ) -> Result<Self, crate::error::StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(specs.request_timeout_secs))
            .build()
            .map_err(|e| {
                crate::error::StoreError::Config(format!("failed to build node client: {e}"))
            })?;

        Ok(Self {
            name: name.into(),
            specs,
            stores,
            client,
            chain_id: RwLock::new(None),
            // Generous default: the bucket protects the node, not the caller.
            limiter: RateLimiter::new(200, 50),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn specs(&self) -> &NodeSpecs {
        &self.specs
    }

    pub(super) fn stores(&self) -> &[Arc<EthConnector>] {
        &self.stores
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Issue one JSON-RPC call downstream, with linear-jittered retries on
    /// 429/503 up to the node's retry budget.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ErrorObject> {
        let request = Request::new(method, Some(params), RequestId::Number(1));
        let max_retries = self.specs.max_retries;

        let mut attempt = 0u32;
        loop {
            if !self.limiter.allow() {
                if attempt >= max_retries {
                    return Err(ErrorObject::from(crate::error::StoreError::DependencyFailure(
                        format!("rate limit for node {:?} exceeded", self.name),
                    )));
                }
                attempt += 1;
                backoff(attempt).await;
                continue;
            }

            let sent = self
                .client
                .post(&self.specs.rpc_url)
                .json(&request)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    warn!(node = %self.name, method, %err, "downstream request failed");
                    return Err(ErrorObject::internal(DOWNSTREAM_UNREACHABLE));
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
            {
                if attempt >= max_retries {
                    // Retries exhausted: the node's answer goes back unmodified.
                    return Err(ErrorObject::from(crate::error::StoreError::DependencyFailure(
                        format!("node {:?} returned HTTP {status}", self.name),
                    )));
                }
                attempt += 1;
                debug!(node = %self.name, method, %status, attempt, "downstream backpressure, retrying");
                backoff(attempt).await;
                continue;
            }

            let envelope: Response = response
                .json()
                .await
                .map_err(|_| ErrorObject::internal(DOWNSTREAM_UNREACHABLE))?;

            // A null result deserializes the same as an absent one, so the
            // no-error case is a success either way.
            return match (envelope.result, envelope.error) {
                (_, Some(error)) => Err(error),
                (Some(result), None) => Ok(result),
                (None, None) => Ok(Value::Null),
            };
        }
    }

    /// Chain id of the downstream node, probed once per process lifetime.
    pub async fn chain_id(&self) -> Result<u64, ErrorObject> {
        if let Some(id) = *self.chain_id.read().await {
            return Ok(id);
        }

        let mut cached = self.chain_id.write().await;
        // Double-checked: another request may have probed while we waited.
        if let Some(id) = *cached {
            return Ok(id);
        }

        let result = self.call("eth_chainId", Value::Array(vec![])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ErrorObject::internal("eth_chainId returned a non-string"))?;
        let id = u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| ErrorObject::internal("eth_chainId returned invalid hex"))?;

        *cached = Some(id);
        debug!(node = %self.name, chain_id = id, "cached downstream chain id");
        Ok(id)
    }

    /// Transparently forward a non-intercepted payload and stream the
    /// response back without re-buffering.
    pub async fn forward(&self, headers: &HeaderMap, body: Bytes) -> HttpResponse<Body> {
        let mut request = self.client.post(&self.specs.rpc_url).body(body);
        for (name, value) in strip_hop_by_hop(headers) {
            if let Some(name) = name {
                // The client computes its own framing headers.
                if name == axum::http::header::HOST || name == axum::http::header::CONTENT_LENGTH {
                    continue;
                }
                request = request.header(name, value);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(node = %self.name, %err, "transparent forward failed");
                return HttpResponse::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .body(Body::from(DOWNSTREAM_UNREACHABLE))
                    .unwrap();
            }
        };

        let status = response.status();
        let downstream_headers = {
            let mut map = HeaderMap::new();
            for (name, value) in response.headers() {
                map.append(name.clone(), value.clone());
            }
            strip_hop_by_hop(&map)
        };

        let mut builder = HttpResponse::builder().status(status);
        for (name, value) in &downstream_headers {
            if name == axum::http::header::CONTENT_LENGTH {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder
            .body(Body::from_stream(response.bytes_stream()))
            .unwrap_or_else(|_| {
                HttpResponse::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .body(Body::from(DOWNSTREAM_UNREACHABLE))
                    .unwrap()
            })
    }

    /// Submit a signed payload through the raw-send family.
    pub async fn send_raw(&self, method: &str, raw: &[u8], extra: Option<Value>) -> Result<Value, ErrorObject> {
        let hex = format!("0x{}", alloy::hex::encode(raw));
        let params = match extra {
            Some(extra) => Value::Array(vec![Value::String(hex), extra]),
            None => Value::Array(vec![Value::String(hex)]),
        };
        self.call(method, params).await
    }
}

/// Linear backoff with jitter: attempt·base plus up to one extra base step.
async fn backoff(attempt: u32) {
    const BASE: Duration = Duration::from_millis(100);
    let jitter = rand::thread_rng().gen_range(0..BASE.as_millis() as u64);
    tokio::time::sleep(BASE * attempt + Duration::from_millis(jitter)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn strips_standard_hop_by_hop_headers() {
        let stripped = strip_hop_by_hop(&headers(&[
            ("content-type", "application/json"),
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "websocket"),
            ("authorization", "Bearer t"),
        ]));

        assert!(stripped.contains_key("content-type"));
        assert!(stripped.contains_key("authorization"));
        assert!(!stripped.contains_key("connection"));
        assert!(!stripped.contains_key("keep-alive"));
        assert!(!stripped.contains_key("transfer-encoding"));
        assert!(!stripped.contains_key("upgrade"));
    }

    #[test]
    fn strips_headers_named_by_connection() {
        let stripped = strip_hop_by_hop(&headers(&[
            ("connection", "x-tracing-budget, X-Other"),
            ("x-tracing-budget", "100"),
            ("x-other", "y"),
            ("x-kept", "z"),
        ]));

        assert!(!stripped.contains_key("x-tracing-budget"));
        assert!(!stripped.contains_key("x-other"));
        assert!(stripped.contains_key("x-kept"));
    }

    fn specs(url: &str) -> NodeSpecs {
        serde_yaml::from_str(&format!("rpcUrl: {url}")).unwrap()
    }

    #[tokio::test]
    async fn call_against_stub_node() {
        use axum::routing::post;
        use axum::{Json, Router};

        async fn rpc(Json(request): Json<Request>) -> Json<Response> {
            assert_eq!(request.method, "eth_chainId");
            Json(Response::success(
                request.id.unwrap(),
                Value::String("0x539".to_string()),
            ))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(rpc)))
                .await
                .unwrap();
        });

        let proxy = NodeProxy::new("stub", specs(&format!("http://{addr}/")), vec![]).unwrap();
        // Probe, then read from cache.
        assert_eq!(proxy.chain_id().await.unwrap(), 1337);
        assert_eq!(proxy.chain_id().await.unwrap(), 1337);
    }

    #[tokio::test]
    async fn unreachable_node_maps_to_internal() {
        let proxy =
            NodeProxy::new("gone", specs("http://127.0.0.1:1/"), vec![]).unwrap();
        let err = proxy.call("eth_blockNumber", Value::Array(vec![])).await.unwrap_err();
        assert_eq!(err.code, crate::jsonrpc::INTERNAL_ERROR);
        assert_eq!(err.message, DOWNSTREAM_UNREACHABLE);
    }

    #[tokio::test]
    async fn downstream_rpc_error_passes_through() {
        use axum::routing::post;
        use axum::{Json, Router};

        async fn rpc(Json(request): Json<Request>) -> Json<Response> {
            Json(Response::failure(
                request.id.unwrap(),
                ErrorObject::new(-32001, "no can do"),
            ))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(rpc)))
                .await
                .unwrap();
        });

        let proxy = NodeProxy::new("stub", specs(&format!("http://{addr}/")), vec![]).unwrap();
        let err = proxy.call("eth_mine", Value::Array(vec![])).await.unwrap_err();
        assert_eq!(err.code, -32001);
        assert_eq!(err.message, "no can do");
    }
}
