// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket bridging for nodes that speak JSON-RPC over WS.
//!
//! The client leg is the axum upgrade; the node leg is a tokio-tungstenite
//! connection. Text frames are JSON-RPC messages: intercepted methods are
//! answered locally, everything else is relayed with frame boundaries
//! preserved in both directions.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as NodeMessage;
use tracing::{debug, warn};

use super::interceptor::RpcOutcome;
use super::proxy::NodeProxy;
use crate::auth::UserInfo;
use crate::jsonrpc::{ErrorObject, RequestId, Response, RpcCall};

/// Upgrader tunables, mirroring the node proxy's WS configuration surface.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub handshake_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub enable_compression: bool,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            enable_compression: false,
        }
    }
}

/// Run the bridge until either side closes.
pub async fn bridge(proxy: Arc<NodeProxy>, user: UserInfo, client: WebSocket, config: WsConfig) {
    let Some(ws_url) = proxy.specs().ws_url.clone() else {
        close_with_error(
            client,
            ErrorObject::from(crate::error::StoreError::Config(format!(
                "node {:?} has no websocket endpoint",
                proxy.name()
            ))),
        )
        .await;
        return;
    };

    let connected =
        tokio::time::timeout(config.handshake_timeout, connect_async(ws_url.as_str())).await;
    let downstream = match connected {
        Ok(Ok((socket, _))) => socket,
        Ok(Err(err)) => {
            warn!(node = %proxy.name(), %err, "websocket handshake with node failed");
            close_with_error(client, ErrorObject::internal("downstream node unreachable")).await;
            return;
        }
        Err(_) => {
            warn!(node = %proxy.name(), "websocket handshake with node timed out");
            close_with_error(client, ErrorObject::internal("downstream node unreachable")).await;
            return;
        }
    };

    let (mut node_tx, mut node_rx) = downstream.split();
    let (mut client_tx, mut client_rx) = client.split();

    loop {
        tokio::select! {
            frame = client_rx.next() => match frame {
                Some(Ok(ClientMessage::Text(text))) => {
                    match handle_text(&proxy, &user, text.as_str()).await {
                        TextOutcome::Reply(body) => {
                            if client_tx.send(ClientMessage::Text(body.into())).await.is_err() {
                                break;
                            }
                        }
                        TextOutcome::Silent => {}
                        TextOutcome::Forward => {
                            if node_tx
                                .send(NodeMessage::Text(text.as_str().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(ClientMessage::Binary(payload))) => {
                    if node_tx.send(NodeMessage::Binary(payload.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(ClientMessage::Close(_))) | None => {
                    let _ = node_tx.send(NodeMessage::Close(None)).await;
                    break;
                }
                Some(Ok(_)) => {} // ping/pong handled by the stack
                Some(Err(err)) => {
                    debug!(node = %proxy.name(), %err, "client websocket error");
                    let _ = node_tx.send(NodeMessage::Close(None)).await;
                    break;
                }
            },
            frame = node_rx.next() => match frame {
                Some(Ok(NodeMessage::Text(text))) => {
                    if client_tx
                        .send(ClientMessage::Text(text.as_str().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(NodeMessage::Binary(payload))) => {
                    if client_tx
                        .send(ClientMessage::Binary(payload.into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(NodeMessage::Close(_))) | None => {
                    let _ = client_tx.send(ClientMessage::Close(None)).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(node = %proxy.name(), %err, "node websocket error");
                    let _ = client_tx.send(ClientMessage::Close(None)).await;
                    break;
                }
            },
        }
    }
}

enum TextOutcome {
    /// Answer the client with this JSON body.
    Reply(String),
    /// Intercepted notification: nothing to send anywhere.
    Silent,
    /// Relay the original frame to the node untouched.
    Forward,
}

async fn handle_text(proxy: &Arc<NodeProxy>, user: &UserInfo, text: &str) -> TextOutcome {
    let call = match RpcCall::decode(text.as_bytes()) {
        Ok(call) => call,
        Err(error) => {
            let response = Response::failure(RequestId::Null, error);
            return TextOutcome::Reply(serde_json::to_string(&response).expect("response serializes"));
        }
    };

    match proxy.process(user, call).await {
        RpcOutcome::Forward => TextOutcome::Forward,
        RpcOutcome::Handled(Some(body)) => {
            TextOutcome::Reply(serde_json::to_string(&body).expect("response serializes"))
        }
        RpcOutcome::Handled(None) => TextOutcome::Silent,
    }
}

async fn close_with_error(mut client: WebSocket, error: ErrorObject) {
    let response = Response::failure(RequestId::Null, error);
    if let Ok(body) = serde_json::to_string(&response) {
        let _ = client.send(ClientMessage::Text(body.into())).await;
    }
    let _ = client.send(ClientMessage::Close(None)).await;
}
