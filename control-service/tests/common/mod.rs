//! Test helpers for control-service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use control_service::{
    AppState, build_router,
    config::{
        CacheConfig, ControlConfig, DatabaseConfig, Environment, GithubConfig, PolicyConfig,
        RateLimitConfig, SecurityConfig, SessionConfig,
    },
    db,
    models::AuditEntry,
    platform::FakePlatform,
    services::{
        ActionDispatcher, AuditFilter, AuditLedger, AuthorizationGate, CredentialBroker,
        PolicyService, SessionService, SystemClock,
    },
};
use http_body_util::BodyExt;
use service_core::middleware::rate_limit::{create_ip_rate_limiter, create_keyed_rate_limiter};
use tower::util::ServiceExt;

pub fn test_config() -> ControlConfig {
    ControlConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "control-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        github: GithubConfig {
            app_id: 1,
            private_key_base64: String::new(),
            api_base: "http://localhost".to_string(),
            orgs: vec!["acme".to_string()],
            upstream_timeout_seconds: 5,
        },
        session: SessionConfig {
            secret: "test-session-secret".to_string(),
            cookie_name: "session".to_string(),
            session_hours: 1,
        },
        policy: PolicyConfig {
            repo_prefix: "dev-".to_string(),
            secret_prefix: "MCP_".to_string(),
            default_team: "infrastructure-admins".to_string(),
            admin_teams: vec!["owners".to_string(), "mcp-auditors".to_string()],
        },
        cache: CacheConfig {
            ttl_seconds: 300,
            capacity: 256,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            act_per_minute: 5,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Router plus handles on the state and the fake platform behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub platform: FakePlatform,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: ControlConfig) -> Self {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&config.database.url)
            .await
            .expect("Failed to open test database");
        db::MIGRATOR
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let platform = FakePlatform::new();
        let upstream_timeout = Duration::from_secs(config.github.upstream_timeout_seconds);
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(platform.clone()),
            Arc::new(SystemClock),
            Duration::from_secs(config.cache.ttl_seconds),
            config.cache.capacity,
            upstream_timeout,
            config.policy.admin_teams.clone(),
        ));

        let state = AppState {
            ledger: AuditLedger::new(pool),
            broker: broker.clone(),
            authz: Arc::new(AuthorizationGate::new(broker)),
            dispatcher: Arc::new(ActionDispatcher::new(upstream_timeout)),
            policy: PolicyService::new(config.policy.clone()),
            sessions: SessionService::new(&config.session),
            act_rate_limiter: create_keyed_rate_limiter(),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
            config,
        };

        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            platform,
        }
    }

    pub fn session_token(&self, email: &str) -> String {
        self.state
            .sessions
            .issue("test-subject", email, "Test User")
            .expect("Failed to issue session token")
    }

    pub async fn post_act(
        &self,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/act")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, body)
    }

    /// Every ledger row, newest first.
    pub async fn audit_rows(&self) -> Vec<AuditEntry> {
        self.state
            .ledger
            .query(&AuditFilter {
                limit: 1000,
                ..Default::default()
            })
            .await
            .expect("Failed to query ledger")
    }
}
