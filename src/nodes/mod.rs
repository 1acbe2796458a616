// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Node Proxy & Interceptor
//!
//! Terminates JSON-RPC traffic addressed to a registered downstream node.
//! Account-operation methods are answered locally with held keys; everything
//! else passes through transparently over a pooled keep-alive connection,
//! with hop-by-hop headers stripped. Nodes that speak JSON-RPC over
//! WebSocket get the same interception over a bridged connection.

pub mod interceptor;
pub mod proxy;
pub mod rate_limit;
pub mod ws;

pub use interceptor::{intercepts, RpcOutcome};
pub use proxy::{strip_hop_by_hop, NodeProxy};
pub use rate_limit::RateLimiter;
pub use ws::{bridge, WsConfig};
