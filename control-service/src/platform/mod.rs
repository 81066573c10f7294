//! Capability surface for the source-control platform.
//!
//! The pipeline only ever talks to these traits. `RestPlatform` is the
//! production adapter; `FakePlatform` backs the tests.

mod fake;
mod rest;

pub use fake::FakePlatform;
pub use rest::RestPlatform;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::services::ControlError;

/// Installation token minted for one organization.
#[derive(Clone)]
pub struct InstallationToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub permissions: HashMap<String, String>,
}

/// Parameters for repository creation.
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub name: String,
    pub private: bool,
    pub description: String,
}

/// Reference to a repository returned by the platform.
#[derive(Debug, Clone)]
pub struct RepositoryRef {
    pub full_name: String,
    pub url: String,
}

/// Public key a repository exposes for secret sealing (base64-encoded).
#[derive(Debug, Clone)]
pub struct SecretPublicKey {
    pub key_id: String,
    pub key: String,
}

/// A secret value sealed for upload (base64-encoded ciphertext).
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub key_id: String,
    pub encrypted_value: String,
}

/// App-level entry point: resolves installations, mints installation tokens
/// and builds clients scoped to them.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// Mint an installation token scoped to `org`. A missing installation is
    /// a `Credential` error, distinct from transport failures.
    async fn issue_token(&self, org: &str) -> Result<InstallationToken, ControlError>;

    /// Build a client that authenticates with `token`.
    fn client_for(&self, token: &SecretString) -> Arc<dyn PlatformClient>;
}

/// The closed set of upstream operations the dispatcher and broker need.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_repo(
        &self,
        org: &str,
        repo: &NewRepository,
    ) -> Result<RepositoryRef, ControlError>;

    async fn delete_repo(&self, org: &str, name: &str) -> Result<(), ControlError>;

    async fn secret_public_key(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<SecretPublicKey, ControlError>;

    async fn put_secret(
        &self,
        org: &str,
        repo: &str,
        name: &str,
        secret: &SealedSecret,
    ) -> Result<(), ControlError>;

    async fn delete_secret(&self, org: &str, repo: &str, name: &str) -> Result<(), ControlError>;

    async fn add_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError>;

    async fn remove_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError>;

    async fn list_user_teams(&self, org: &str, username: &str)
        -> Result<Vec<String>, ControlError>;

    async fn team_has_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<bool, ControlError>;

    async fn list_repos(&self, org: &str) -> Result<Vec<String>, ControlError>;
}
