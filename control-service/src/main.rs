use control_service::{
    AppState, build_router,
    config::ControlConfig,
    db,
    platform::RestPlatform,
    services::{
        ActionDispatcher, AuditLedger, AuthorizationGate, CredentialBroker, PolicyService,
        SessionService, SystemClock,
    },
};
use service_core::middleware::rate_limit::{create_ip_rate_limiter, create_keyed_rate_limiter};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = ControlConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting control service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let ledger = AuditLedger::new(pool);

    let connector = Arc::new(RestPlatform::new(&config.github)?);
    let upstream_timeout = Duration::from_secs(config.github.upstream_timeout_seconds);
    let broker = Arc::new(CredentialBroker::new(
        connector,
        Arc::new(SystemClock),
        Duration::from_secs(config.cache.ttl_seconds),
        config.cache.capacity,
        upstream_timeout,
        config.policy.admin_teams.clone(),
    ));
    tracing::info!("Credential broker initialized");

    let authz = Arc::new(AuthorizationGate::new(broker.clone()));
    let dispatcher = Arc::new(ActionDispatcher::new(upstream_timeout));
    let policy = PolicyService::new(config.policy.clone());
    let sessions = SessionService::new(&config.session);

    let act_rate_limiter = create_keyed_rate_limiter();
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Action and Global IP");

    let port = config.common.port;
    let state = AppState {
        config,
        ledger,
        broker,
        authz,
        dispatcher,
        policy,
        sessions,
        act_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Give in-flight requests a moment to complete
    tokio::time::sleep(Duration::from_secs(5)).await;
}
