//! Read-only snapshot API.
//!
//! A single endpoint exposing the registry's in-memory view of every node.
//! Handlers never touch the network: the response is assembled entirely from
//! registry state, so a wedged node connection can never wedge the API.

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use forkwatch_core::{
    config::ServerConfig,
    registry::{NodeRegistry, NodeSnapshot},
};
use std::{collections::BTreeMap, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::debug;

/// Builds the API router with CORS applied per configuration.
pub fn api_router(registry: Arc<NodeRegistry>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/nodes", get(get_nodes))
        .layer(cors_layer(&config.cors_origins))
        .with_state(registry)
}

/// Returns per-node connectivity and the retained momentum window.
async fn get_nodes(
    State(registry): State<Arc<NodeRegistry>>,
) -> Json<BTreeMap<String, NodeSnapshot>> {
    debug!("node snapshot requested");
    Json(registry.snapshot())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> =
        origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
