// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC surface for registered nodes: `POST /nodes/{nodeName}` and the
//! WebSocket upgrade on `GET /nodes/{nodeName}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;

use crate::auth::authenticate;
use crate::jsonrpc::{RequestId, Response, RpcCall};
use crate::nodes::{bridge, NodeProxy, RpcOutcome, WsConfig};
use crate::state::AppState;

fn resolve_node(state: &AppState, name: &str) -> Result<Arc<NodeProxy>, AxumResponse> {
    state.registry.node(name).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("node {name:?} not found") })),
        )
            .into_response()
    })
}

/// Terminate a JSON-RPC request for a node.
///
/// Bodies whose every entry is pass-through are forwarded as raw bytes with
/// the response streamed back; anything touching the intercept set is
/// processed request by request. Protocol-level failures (parse errors, bad
/// envelopes) are still `200 OK` with a JSON-RPC error body.
pub async fn rpc(
    State(state): State<AppState>,
    Path(node_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AxumResponse {
    let proxy = match resolve_node(&state, &node_name) {
        Ok(proxy) => proxy,
        Err(response) => return response,
    };

    let user = match authenticate(headers.get(axum::http::header::AUTHORIZATION), &state).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };

    let call = match RpcCall::decode(&body) {
        Ok(call) => call,
        Err(error) => {
            return Json(Response::failure(RequestId::Null, error)).into_response();
        }
    };

    match proxy.process(&user, call).await {
        RpcOutcome::Handled(Some(reply)) => Json(reply).into_response(),
        RpcOutcome::Handled(None) => StatusCode::NO_CONTENT.into_response(),
        RpcOutcome::Forward => proxy.forward(&headers, body).await.into_response(),
    }
}

/// Upgrade to JSON-RPC over WebSocket, bridged to the node's WS endpoint.
///
/// Authentication happens on the handshake headers, before the protocol
/// switch; the resolved principal is pinned for the connection's lifetime.
pub async fn ws(
    State(state): State<AppState>,
    Path(node_name): Path<String>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> AxumResponse {
    let proxy = match resolve_node(&state, &node_name) {
        Ok(proxy) => proxy,
        Err(response) => return response,
    };

    let user = match authenticate(headers.get(axum::http::header::AUTHORIZATION), &state).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };

    upgrade.on_upgrade(move |socket| bridge(proxy, user, socket, WsConfig::default()))
}
