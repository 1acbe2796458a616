// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Key Manager
//!
//! Brokers cryptographic key material across pluggable backends and exposes
//! a uniform REST and JSON-RPC surface. Blockchain node clients point at the
//! node proxy, which intercepts account-operation methods (`eth_accounts`,
//! `eth_sign`, `eth_signTransaction`, `eth_sendTransaction` and the private
//! variants), signs locally with held keys, and forwards everything else to
//! the downstream node untouched.
//!
//! ## Modules
//!
//! - `api` - HTTP surface (Axum): REST accounts, node JSON-RPC, health
//! - `auth` - Authentication (JWT/JWKS) and the permission model
//! - `database` - Soft-delete metadata cache (redb)
//! - `jsonrpc` - JSON-RPC 2.0 envelope codec
//! - `manifests` - Declarative YAML resources and the one-shot loader
//! - `nodes` - Reverse proxy, method interceptor, WebSocket bridge
//! - `registry` - Manifest-driven runtime object graph
//! - `stores` - Key store contract, local driver, Ethereum connector

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod jsonrpc;
pub mod manifests;
pub mod nodes;
pub mod registry;
pub mod state;
pub mod stores;
