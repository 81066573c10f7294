use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub session: SessionConfig,
    pub policy: PolicyConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub app_id: u64,
    pub private_key_base64: String,
    pub api_base: String,
    /// Organizations covered by the identity report surface.
    pub orgs: Vec<String>,
    pub upstream_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub session_hours: i64,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub repo_prefix: String,
    pub secret_prefix: String,
    pub default_team: String,
    pub admin_teams: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub act_per_minute: u32,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl ControlConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = ControlConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("github-control-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("AUDIT_DB_URL", Some("sqlite://audit.db"), is_prod)?,
                max_connections: get_env("AUDIT_DB_MAX_CONNECTIONS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
            },
            github: GithubConfig {
                app_id: get_env("GITHUB_APP_ID", None, is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!("GITHUB_APP_ID: {e}"))
                    })?,
                private_key_base64: get_env("GITHUB_PRIVATE_KEY_BASE64", None, is_prod)?,
                api_base: get_env("GITHUB_API_BASE", Some("https://api.github.com"), is_prod)?,
                orgs: split_list(&get_env("GITHUB_ORGS", Some(""), is_prod)?),
                upstream_timeout_seconds: get_env("GITHUB_UPSTREAM_TIMEOUT_SECONDS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
            },
            session: SessionConfig {
                secret: get_env("SESSION_SECRET", None, is_prod)?,
                cookie_name: get_env("SESSION_COOKIE_NAME", Some("session"), is_prod)?,
                session_hours: get_env("SESSION_HOURS", Some("1"), is_prod)?
                    .parse()
                    .unwrap_or(1),
            },
            policy: PolicyConfig {
                repo_prefix: get_env("POLICY_REPO_PREFIX", Some("dev-"), is_prod)?,
                secret_prefix: get_env("POLICY_SECRET_PREFIX", Some("MCP_"), is_prod)?,
                default_team: get_env(
                    "POLICY_DEFAULT_TEAM",
                    Some("infrastructure-admins"),
                    is_prod,
                )?,
                admin_teams: split_list(&get_env(
                    "POLICY_ADMIN_TEAMS",
                    Some("owners,mcp-auditors"),
                    is_prod,
                )?),
            },
            cache: CacheConfig {
                ttl_seconds: get_env("CACHE_TTL_SECONDS", Some("300"), is_prod)?
                    .parse()
                    .unwrap_or(300),
                capacity: get_env("CACHE_CAPACITY", Some("256"), is_prod)?
                    .parse()
                    .unwrap_or(256),
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                act_per_minute: get_env("RATE_LIMIT_ACT_PER_MINUTE", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CACHE_TTL_SECONDS must be positive"
            )));
        }

        if self.github.upstream_timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GITHUB_UPSTREAM_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
