use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::time::timeout;

use super::cache::{Clock, TtlCache};
use super::error::ControlError;
use crate::platform::{PlatformClient, PlatformConnector};

/// Installation token scoped to one organization, with upstream metadata.
#[derive(Clone, Debug)]
pub struct CachedCredential {
    pub org: String,
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub permissions: HashMap<String, String>,
}

/// Team memberships of one user in one organization.
#[derive(Debug, Clone)]
pub struct MembershipFact {
    pub username: String,
    pub org: String,
    pub teams: HashSet<String>,
    pub cached_at: DateTime<Utc>,
}

/// Acquires and caches installation credentials, membership facts and
/// repository listings for the organizations the app is installed in.
///
/// Each cache fills with single-flight discipline; entries expire after the
/// configured TTL, and token entries additionally respect the upstream
/// token's own expiry. Stale entries are never served.
pub struct CredentialBroker {
    connector: Arc<dyn PlatformConnector>,
    clock: Arc<dyn Clock>,
    upstream_timeout: Duration,
    admin_teams: Vec<String>,
    tokens: TtlCache<CachedCredential>,
    memberships: TtlCache<MembershipFact>,
    repos: TtlCache<Vec<String>>,
}

impl CredentialBroker {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        capacity: usize,
        upstream_timeout: Duration,
        admin_teams: Vec<String>,
    ) -> Self {
        Self {
            connector,
            clock: clock.clone(),
            upstream_timeout,
            admin_teams,
            tokens: TtlCache::new(ttl, capacity, clock.clone()),
            memberships: TtlCache::new(ttl, capacity, clock.clone()),
            repos: TtlCache::new(ttl, capacity, clock),
        }
    }

    /// Scoped platform client for the organization, minting an installation
    /// token on first use and re-using it until expiry.
    pub async fn get_client(&self, org: &str) -> Result<Arc<dyn PlatformClient>, ControlError> {
        let credential = self.credential(org).await?;
        Ok(self.connector.client_for(&credential.token))
    }

    /// The organization's cached installation credential.
    pub async fn credential(&self, org: &str) -> Result<CachedCredential, ControlError> {
        let connector = self.connector.clone();
        let org_owned = org.to_string();
        let deadline = self.upstream_timeout;

        self.tokens
            .get_or_fetch(org, move || async move {
                let token = timeout(deadline, connector.issue_token(&org_owned))
                    .await
                    .map_err(|_| {
                        ControlError::Upstream(format!(
                            "token issuance for org {org_owned} timed out"
                        ))
                    })??;
                let expires_at = token.expires_at;
                Ok((
                    CachedCredential {
                        org: org_owned,
                        token: token.token,
                        expires_at,
                        permissions: token.permissions,
                    },
                    Some(expires_at),
                ))
            })
            .await
    }

    /// Team membership facts for `username` in `org`, with staleness bounded
    /// by the cache TTL.
    pub async fn membership(
        &self,
        username: &str,
        org: &str,
    ) -> Result<MembershipFact, ControlError> {
        let key = format!("{org}/{username}");
        let client = self.get_client(org).await?;
        let clock = self.clock.clone();
        let deadline = self.upstream_timeout;
        let username_owned = username.to_string();
        let org_owned = org.to_string();

        self.memberships
            .get_or_fetch(&key, move || async move {
                let teams = timeout(
                    deadline,
                    client.list_user_teams(&org_owned, &username_owned),
                )
                .await
                .map_err(|_| {
                    ControlError::Upstream(format!(
                        "membership lookup for {username_owned} in {org_owned} timed out"
                    ))
                })??;
                Ok((
                    MembershipFact {
                        username: username_owned,
                        org: org_owned,
                        teams: teams.into_iter().collect(),
                        cached_at: clock.now(),
                    },
                    None,
                ))
            })
            .await
    }

    /// Repositories visible to the organization's installation.
    pub async fn installation_repos(&self, org: &str) -> Result<Vec<String>, ControlError> {
        let client = self.get_client(org).await?;
        let deadline = self.upstream_timeout;
        let org_owned = org.to_string();

        self.repos
            .get_or_fetch(org, move || async move {
                let repos = timeout(deadline, client.list_repos(&org_owned))
                    .await
                    .map_err(|_| {
                        ControlError::Upstream(format!(
                            "repository listing for org {org_owned} timed out"
                        ))
                    })??;
                Ok((repos, None))
            })
            .await
    }

    /// Installation token metadata for the identity report: expiry and
    /// permissions, never the token itself.
    pub async fn token_metadata(
        &self,
        org: &str,
    ) -> Result<(DateTime<Utc>, HashMap<String, String>), ControlError> {
        let credential = self.credential(org).await?;
        Ok((credential.expires_at, credential.permissions))
    }

    /// Whether `username` belongs to any configured admin team. Lookup
    /// failures count as "no", never as "yes".
    pub async fn is_org_admin(&self, org: &str, username: &str) -> bool {
        let client = match self.get_client(org).await {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(org, error = %err, "Admin check could not resolve a client; denying");
                return false;
            }
        };

        for team in &self.admin_teams {
            match timeout(
                self.upstream_timeout,
                client.team_has_member(org, team, username),
            )
            .await
            {
                Ok(Ok(true)) => return true,
                Ok(Ok(false)) => {}
                Ok(Err(err)) => {
                    tracing::debug!(org, team, error = %err, "Admin team lookup failed");
                }
                Err(_) => {
                    tracing::debug!(org, team, "Admin team lookup timed out");
                }
            }
        }

        false
    }
}
