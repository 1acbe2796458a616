// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

use crate::state::AppState;

pub mod accounts;
pub mod health;
pub mod nodes;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Ethereum account surface
        .route(
            "/stores/{storeName}/ethereum",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}",
            get(accounts::get_account)
                .put(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}/restore",
            put(accounts::restore_account),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}/destroy",
            delete(accounts::destroy_account),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}/sign",
            post(accounts::sign_message),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}/sign-transaction",
            post(accounts::sign_transaction),
        )
        .route(
            "/stores/{storeName}/ethereum/{address}/sign-typed-data",
            post(accounts::sign_typed_data),
        )
        // Node proxy: JSON-RPC over HTTP, WebSocket upgrade on GET
        .route("/nodes/{nodeName}", post(nodes::rpc).get(nodes::ws))
        // OpenAPI document
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(build_cors_layer())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build CORS layer from environment configuration.
///
/// - If `CORS_ALLOWED_ORIGINS` is set, only those origins are allowed
///   (comma-separated).
/// - If not set, falls back to permissive CORS (development only).
fn build_cors_layer() -> CorsLayer {
    if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
        let allowed: Vec<_> = origins
            .split(',')
            .map(|s| s.trim().parse().expect("Invalid CORS origin"))
            .collect();
        tracing::info!(origins = %origins, "CORS: restricting to configured origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set - using permissive CORS (development only)");
        CorsLayer::permissive()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        accounts::create_account,
        accounts::list_accounts,
        accounts::get_account,
        accounts::update_account,
        accounts::delete_account,
        accounts::restore_account,
        accounts::destroy_account,
        accounts::sign_message,
        accounts::sign_transaction,
        accounts::sign_typed_data,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(schemas(
        accounts::CreateEthAccountRequest,
        accounts::UpdateEthAccountRequest,
        accounts::SignMessageRequest,
        accounts::SignatureResponse,
        accounts::RawTransactionResponse,
        accounts::EthAccountResponse,
        health::HealthResponse,
        health::HealthChecks,
        health::ReadyResponse
    )),
    tags(
        (name = "Ethereum", description = "Ethereum account lifecycle and signing"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
