// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::EnvFilter;

use relational_keymanager::api::router;
use relational_keymanager::auth::JwksManager;
use relational_keymanager::config::Config;
use relational_keymanager::database::MetadataDb;
use relational_keymanager::manifests::LocalLoader;
use relational_keymanager::registry::Registry;
use relational_keymanager::state::{AppState, AuthSettings};

#[tokio::main]
async fn main() {
    let config = Config::from_env().unwrap_or_else(|err| {
        eprintln!("configuration error: {err}");
        std::process::exit(1);
    });

    init_tracing(&config.logger.level, &config.logger.format);

    let db = MetadataDb::open(&config.db_path).unwrap_or_else(|err| {
        tracing::error!(path = %config.db_path.display(), %err, "failed to open metadata database");
        std::process::exit(1);
    });

    let loader = LocalLoader::new(&config.manifests.path).unwrap_or_else(|err| {
        tracing::error!(%err, "failed to initialize manifest loader");
        std::process::exit(1);
    });

    let registry = Arc::new(Registry::new(db));
    if let Err(err) = registry.start(&loader).await {
        tracing::error!(%err, "manifest load failed");
        std::process::exit(1);
    }
    if let Err(err) = registry.check_readiness() {
        tracing::warn!(%err, "starting degraded: not all components are ready");
    }

    let auth = AuthSettings {
        jwks: config
            .auth
            .jwks_url
            .as_deref()
            .map(|url| Arc::new(JwksManager::new(url))),
        issuer: config.auth.oidc_issuer.clone(),
        audience: config.auth.audience.clone(),
    };
    if auth.jwks.is_none() {
        tracing::warn!("AUTH_JWKS_URL not set - JWT signatures are NOT verified (development only)");
    }

    let state = AppState::new(Arc::clone(&registry)).with_auth(auth);
    let request_timeout =
        Duration::from_secs(config.http.read_timeout_secs + config.http.write_timeout_secs);
    let app = router(state).layer(TimeoutLayer::new(request_timeout));

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, "key manager listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server failed");
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
