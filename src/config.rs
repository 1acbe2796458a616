// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LOG_LEVEL` | Log level filter (overridden by `RUST_LOG`) | `info` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `HTTP_HOST` | Server bind address | `127.0.0.1` |
//! | `HTTP_PORT` | Server bind port | `8080` |
//! | `HTTP_READ_TIMEOUT_SECS` | Per-request read timeout | `30` |
//! | `HTTP_WRITE_TIMEOUT_SECS` | Per-request write timeout | `30` |
//! | `HTTP_IDLE_TIMEOUT_SECS` | Keep-alive idle timeout | `120` |
//! | `MANIFEST_PATH` | Manifest file or directory | Required |
//! | `DB_PATH` | Metadata database file | `./keymanager.redb` |
//! | `AUTH_OIDC_ISSUER` | Expected JWT issuer | Optional |
//! | `AUTH_JWKS_URL` | JWKS endpoint for JWT verification | Optional (dev mode when unset) |
//! | `AUTH_AUDIENCE` | Expected JWT audience | Optional |

use std::env;
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ManifestsConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub oidc_issuer: Option<String>,
    pub jwks_url: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub logger: LoggerConfig,
    pub http: HttpConfig,
    pub manifests: ManifestsConfig,
    pub auth: AuthConfig,
    pub db_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> StoreResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| StoreError::Config(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load the configuration from the environment.
    pub fn from_env() -> StoreResult<Self> {
        let manifest_path = env::var("MANIFEST_PATH")
            .map_err(|_| StoreError::Config("MANIFEST_PATH is required".to_string()))?;

        Ok(Self {
            logger: LoggerConfig {
                level: var_or("LOG_LEVEL", "info"),
                format: var_or("LOG_FORMAT", "pretty"),
            },
            http: HttpConfig {
                host: var_or("HTTP_HOST", "127.0.0.1"),
                port: parse_var("HTTP_PORT", 8080)?,
                read_timeout_secs: parse_var("HTTP_READ_TIMEOUT_SECS", 30)?,
                write_timeout_secs: parse_var("HTTP_WRITE_TIMEOUT_SECS", 30)?,
                idle_timeout_secs: parse_var("HTTP_IDLE_TIMEOUT_SECS", 120)?,
            },
            manifests: ManifestsConfig {
                path: PathBuf::from(manifest_path),
            },
            auth: AuthConfig {
                oidc_issuer: env::var("AUTH_OIDC_ISSUER").ok(),
                jwks_url: env::var("AUTH_JWKS_URL").ok(),
                audience: env::var("AUTH_AUDIENCE").ok(),
            },
            db_path: PathBuf::from(var_or("DB_PATH", "./keymanager.redb")),
        })
    }
}
