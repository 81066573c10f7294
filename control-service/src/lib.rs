pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod platform;
pub mod services;

use axum::{
    Json, Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use service_core::error::AppError;
use service_core::middleware::rate_limit::{
    IpRateLimiter, KeyedRateLimiter, ip_rate_limit_middleware,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};

use crate::config::ControlConfig;
use crate::services::{
    ActionDispatcher, AuditLedger, AuthorizationGate, CredentialBroker, PolicyService,
    SessionService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: ControlConfig,
    pub ledger: AuditLedger,
    pub broker: Arc<CredentialBroker>,
    pub authz: Arc<AuthorizationGate>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub policy: PolicyService,
    pub sessions: SessionService,
    pub act_rate_limiter: KeyedRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // The action surface carries its own per-identity quota on top of the
    // session requirement.
    let act_route = Router::new().route("/act", post(handlers::act::act)).layer(
        from_fn_with_state(state.clone(), middleware::action_rate_limit_middleware),
    );

    let authenticated = Router::new()
        .merge(act_route)
        .route("/audit", get(handlers::audit::audit_logs))
        .route("/me", get(handlers::me::identity_report))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::session_auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(authenticated)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|origin| {
                            origin
                                .parse::<HeaderValue>()
                                .map_err(|e| {
                                    tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                                    e
                                })
                                .ok()
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Landing document for the control surface.
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the GitHub control service",
        "actions": ["/act", "/audit", "/me"],
        "health": "/health",
    }))
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    db::health_check(state.ledger.pool()).await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
