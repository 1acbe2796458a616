// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Manifests
//!
//! Declarative YAML resource descriptions and the one-shot loader that
//! publishes them to kind-filtered subscribers.

pub mod loader;
pub mod types;

pub use loader::{LocalLoader, Message, Subscription};
pub use types::{EthereumSpecs, Kind, Manifest, NodeSpecs, RoleSpecs};
