//! HTTP surface: routing, shared state and layers

pub mod recharge;

use crate::health::{HealthChecker, HealthState};
use crate::middleware::auth::JwtVerifier;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::RechargeService;
use axum::{
    extract::{FromRef, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub recharge_service: Arc<RechargeService>,
    pub jwt: JwtVerifier,
    pub health_checker: HealthChecker,
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Full application router with request-id and logging layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/recharge/create", post(recharge::create_recharge))
        .route("/api/recharge/verify", post(recharge::verify_recharge))
        .route("/api/recharge/history", get(recharge::recharge_history))
        .route("/api/recharge/balance", get(recharge::wallet_balance))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// CORS policy; an empty list or `*` allows any origin
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(origins)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health_checker.check_health().await;

    if status.status == HealthState::Unhealthy {
        error!("Health check failed, service unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(status))
    } else {
        (StatusCode::OK, Json(status))
    }
}
