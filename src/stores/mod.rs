// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Stores
//!
//! The backend-agnostic key store contract, the in-tree local driver, and
//! the Ethereum connector that layers account semantics on top.

pub mod entities;
pub mod ethereum;
pub mod keystore;
pub mod local;

pub use entities::{Algorithm, Attributes, Curve, Key, KeyMetadata, KeyType};
pub use ethereum::EthConnector;
pub use keystore::KeyStore;
pub use local::LocalKeyStore;
