//! GitHub REST adapter for the platform capability traits.
//!
//! Authenticates as the app with a short-lived RS256 JWT, resolves the
//! organization installation, mints installation tokens and performs the
//! repo / secret / team operations against the REST API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::config::GithubConfig;
use crate::services::ControlError;

use super::{
    InstallationToken, NewRepository, PlatformClient, PlatformConnector, RepositoryRef,
    SealedSecret, SecretPublicKey,
};

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

#[derive(Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// App-level connector holding the app id and signing key.
pub struct RestPlatform {
    http: reqwest::Client,
    api_base: String,
    app_id: u64,
    signing_key: EncodingKey,
}

impl RestPlatform {
    pub fn new(config: &GithubConfig) -> Result<Self, AppError> {
        let pem = BASE64.decode(&config.private_key_base64).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "GITHUB_PRIVATE_KEY_BASE64 is not valid base64: {e}"
            ))
        })?;
        let signing_key = EncodingKey::from_rsa_pem(&pem).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to parse app private key: {e}"))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .user_agent(concat!("control-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {e}"))
            })?;

        tracing::info!(app_id = config.app_id, "GitHub App connector initialized");

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_id: config.app_id,
            signing_key,
        })
    }

    /// Short-lived app JWT for the installation endpoints. Issued-at is
    /// backdated 60s to absorb clock drift, per the platform's guidance.
    fn app_jwt(&self) -> Result<String, ControlError> {
        let now = Utc::now().timestamp();
        let claims = AppJwtClaims {
            iat: now - 60,
            exp: now + 540,
            iss: self.app_id.to_string(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ControlError::Credential(format!("failed to sign app JWT: {e}")))
    }
}

#[derive(Deserialize)]
struct InstallationLookup {
    id: u64,
}

#[derive(Deserialize)]
struct AccessTokenGrant {
    token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    permissions: HashMap<String, String>,
}

#[async_trait]
impl PlatformConnector for RestPlatform {
    async fn issue_token(&self, org: &str) -> Result<InstallationToken, ControlError> {
        let jwt = self.app_jwt()?;

        let lookup_url = format!("{}/orgs/{}/installation", self.api_base, org);
        let response = self
            .http
            .get(&lookup_url)
            .bearer_auth(&jwt)
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ControlError::Credential(format!(
                "GitHub App installation not found for org={org}"
            )));
        }
        let installation: InstallationLookup = check(response, "installation lookup")
            .await?
            .json()
            .await
            .map_err(transport)?;

        let token_url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation.id
        );
        let response = self
            .http
            .post(&token_url)
            .bearer_auth(&jwt)
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(transport)?;
        let grant: AccessTokenGrant = check(response, "token issuance")
            .await?
            .json()
            .await
            .map_err(transport)?;

        Ok(InstallationToken {
            token: SecretString::new(grant.token),
            expires_at: grant.expires_at,
            permissions: grant.permissions,
        })
    }

    fn client_for(&self, token: &SecretString) -> Arc<dyn PlatformClient> {
        Arc::new(RestClient {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            token: token.clone(),
        })
    }
}

/// Client scoped to one installation token.
struct RestClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
}

impl RestClient {
    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.auth(self.http.get(url))
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
    }
}

#[async_trait]
impl PlatformClient for RestClient {
    async fn create_repo(
        &self,
        org: &str,
        repo: &NewRepository,
    ) -> Result<RepositoryRef, ControlError> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            private: bool,
            description: &'a str,
        }
        #[derive(Deserialize)]
        struct Created {
            full_name: String,
            html_url: String,
        }

        let url = format!("{}/orgs/{}/repos", self.api_base, org);
        let response = self
            .auth(self.http.post(&url))
            .json(&Body {
                name: &repo.name,
                private: repo.private,
                description: &repo.description,
            })
            .send()
            .await
            .map_err(transport)?;
        let created: Created = check(response, "repository creation")
            .await?
            .json()
            .await
            .map_err(transport)?;

        Ok(RepositoryRef {
            full_name: created.full_name,
            url: created.html_url,
        })
    }

    async fn delete_repo(&self, org: &str, name: &str) -> Result<(), ControlError> {
        let url = format!("{}/repos/{}/{}", self.api_base, org, name);
        let response = self
            .auth(self.http.delete(&url))
            .send()
            .await
            .map_err(transport)?;
        check(response, "repository deletion").await?;
        Ok(())
    }

    async fn secret_public_key(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<SecretPublicKey, ControlError> {
        #[derive(Deserialize)]
        struct Key {
            key_id: String,
            key: String,
        }

        let url = format!(
            "{}/repos/{}/{}/actions/secrets/public-key",
            self.api_base, org, repo
        );
        let key: Key = check(
            self.get(url).send().await.map_err(transport)?,
            "secret public key fetch",
        )
        .await?
        .json()
        .await
        .map_err(transport)?;

        Ok(SecretPublicKey {
            key_id: key.key_id,
            key: key.key,
        })
    }

    async fn put_secret(
        &self,
        org: &str,
        repo: &str,
        name: &str,
        secret: &SealedSecret,
    ) -> Result<(), ControlError> {
        #[derive(Serialize)]
        struct Body<'a> {
            encrypted_value: &'a str,
            key_id: &'a str,
        }

        let url = format!(
            "{}/repos/{}/{}/actions/secrets/{}",
            self.api_base, org, repo, name
        );
        let response = self
            .auth(self.http.put(&url))
            .json(&Body {
                encrypted_value: &secret.encrypted_value,
                key_id: &secret.key_id,
            })
            .send()
            .await
            .map_err(transport)?;
        check(response, "secret upload").await?;
        Ok(())
    }

    async fn delete_secret(&self, org: &str, repo: &str, name: &str) -> Result<(), ControlError> {
        let url = format!(
            "{}/repos/{}/{}/actions/secrets/{}",
            self.api_base, org, repo, name
        );
        let response = self
            .auth(self.http.delete(&url))
            .send()
            .await
            .map_err(transport)?;
        check(response, "secret deletion").await?;
        Ok(())
    }

    async fn add_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError> {
        let url = format!(
            "{}/orgs/{}/teams/{}/memberships/{}",
            self.api_base, org, team, username
        );
        let response = self
            .auth(self.http.put(&url))
            .json(&serde_json::json!({ "role": "member" }))
            .send()
            .await
            .map_err(transport)?;
        check(response, "team membership add").await?;
        Ok(())
    }

    async fn remove_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError> {
        let url = format!(
            "{}/orgs/{}/teams/{}/memberships/{}",
            self.api_base, org, team, username
        );
        let response = self
            .auth(self.http.delete(&url))
            .send()
            .await
            .map_err(transport)?;
        check(response, "team membership removal").await?;
        Ok(())
    }

    async fn list_user_teams(
        &self,
        org: &str,
        username: &str,
    ) -> Result<Vec<String>, ControlError> {
        // The REST surface has no direct user-to-teams listing for an
        // installation, so enumerate teams and probe membership.
        #[derive(Deserialize)]
        struct Team {
            slug: String,
        }

        let url = format!("{}/orgs/{}/teams?per_page=100", self.api_base, org);
        let teams: Vec<Team> = check(
            self.get(url).send().await.map_err(transport)?,
            "team listing",
        )
        .await?
        .json()
        .await
        .map_err(transport)?;

        let mut memberships = Vec::new();
        for team in teams {
            if self.team_has_member(org, &team.slug, username).await? {
                memberships.push(team.slug);
            }
        }
        Ok(memberships)
    }

    async fn team_has_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<bool, ControlError> {
        let url = format!(
            "{}/orgs/{}/teams/{}/memberships/{}",
            self.api_base, org, team, username
        );
        let response = self.get(url).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ControlError::Upstream(format!(
                "team membership check returned {status}"
            ))),
        }
    }

    async fn list_repos(&self, org: &str) -> Result<Vec<String>, ControlError> {
        #[derive(Deserialize)]
        struct Repo {
            full_name: String,
        }

        let url = format!("{}/orgs/{}/repos?per_page=100", self.api_base, org);
        let repos: Vec<Repo> = check(
            self.get(url).send().await.map_err(transport)?,
            "repository listing",
        )
        .await?
        .json()
        .await
        .map_err(transport)?;

        Ok(repos.into_iter().map(|repo| repo.full_name).collect())
    }
}

fn transport(err: reqwest::Error) -> ControlError {
    ControlError::Upstream(format!("request failed: {err}"))
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ControlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ControlError::Upstream(format!(
        "{what} returned {status}: {body}"
    )))
}
