//! In-memory platform double for tests.
//!
//! Records every mutating call, counts upstream fetches so caching
//! properties can be asserted, and ships a real sealed-box keypair so the
//! secret path works end to end.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration as TokenDuration, Utc};
use crypto_box::aead::OsRng;
use secrecy::SecretString;

use crate::services::ControlError;

use super::{
    InstallationToken, NewRepository, PlatformClient, PlatformConnector, RepositoryRef,
    SealedSecret, SecretPublicKey,
};

#[derive(Clone)]
pub struct FakePlatform {
    inner: Arc<FakeState>,
}

struct FakeState {
    token_issuances: AtomicUsize,
    membership_lookups: AtomicUsize,
    fail_installations: AtomicBool,
    fail_memberships: AtomicBool,
    fail_secret_uploads: AtomicBool,
    issue_delay: Mutex<Duration>,
    call_delay: Mutex<Duration>,
    // org/team -> members
    teams: Mutex<HashMap<String, HashSet<String>>>,
    repos: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<String>>,
    secret_key: crypto_box::SecretKey,
}

impl FakePlatform {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeState {
                token_issuances: AtomicUsize::new(0),
                membership_lookups: AtomicUsize::new(0),
                fail_installations: AtomicBool::new(false),
                fail_memberships: AtomicBool::new(false),
                fail_secret_uploads: AtomicBool::new(false),
                issue_delay: Mutex::new(Duration::ZERO),
                call_delay: Mutex::new(Duration::ZERO),
                teams: Mutex::new(HashMap::new()),
                repos: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                secret_key: crypto_box::SecretKey::generate(&mut OsRng),
            }),
        }
    }

    pub fn grant_team(&self, org: &str, team: &str, username: &str) {
        self.inner
            .teams
            .lock()
            .unwrap()
            .entry(format!("{org}/{team}"))
            .or_default()
            .insert(username.to_string());
    }

    pub fn set_repos(&self, org: &str, repos: Vec<String>) {
        self.inner
            .repos
            .lock()
            .unwrap()
            .insert(org.to_string(), repos);
    }

    pub fn fail_installations(&self, fail: bool) {
        self.inner.fail_installations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_memberships(&self, fail: bool) {
        self.inner.fail_memberships.store(fail, Ordering::SeqCst);
    }

    pub fn fail_secret_uploads(&self, fail: bool) {
        self.inner.fail_secret_uploads.store(fail, Ordering::SeqCst);
    }

    /// Delay token issuance so tests can force overlapping fetches.
    pub fn set_issue_delay(&self, delay: Duration) {
        *self.inner.issue_delay.lock().unwrap() = delay;
    }

    /// Delay every client call so tests can exercise the dispatch timeout.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.inner.call_delay.lock().unwrap() = delay;
    }

    pub fn token_issuances(&self) -> usize {
        self.inner.token_issuances.load(Ordering::SeqCst)
    }

    pub fn membership_lookups(&self) -> usize {
        self.inner.membership_lookups.load(Ordering::SeqCst)
    }

    /// Mutating calls observed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// The private half of the sealing keypair, for tests that open sealed
    /// values.
    pub fn sealing_key(&self) -> &crypto_box::SecretKey {
        &self.inner.secret_key
    }
}

#[async_trait]
impl PlatformConnector for FakePlatform {
    async fn issue_token(&self, org: &str) -> Result<InstallationToken, ControlError> {
        let delay = *self.inner.issue_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.inner.fail_installations.load(Ordering::SeqCst) {
            return Err(ControlError::Credential(format!(
                "GitHub App installation not found for org={org}"
            )));
        }

        let count = self.inner.token_issuances.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InstallationToken {
            token: SecretString::new(format!("ghs_{org}_{count}")),
            expires_at: Utc::now() + TokenDuration::hours(1),
            permissions: HashMap::from([("administration".to_string(), "write".to_string())]),
        })
    }

    fn client_for(&self, token: &SecretString) -> Arc<dyn PlatformClient> {
        Arc::new(FakeClient {
            state: self.inner.clone(),
            _token: token.clone(),
        })
    }
}

struct FakeClient {
    state: Arc<FakeState>,
    _token: SecretString,
}

impl FakeClient {
    async fn pause(&self) {
        let delay = *self.state.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: String) {
        self.state.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformClient for FakeClient {
    async fn create_repo(
        &self,
        org: &str,
        repo: &NewRepository,
    ) -> Result<RepositoryRef, ControlError> {
        self.pause().await;
        self.record(format!(
            "create_repo {org} {} private={}",
            repo.name, repo.private
        ));
        Ok(RepositoryRef {
            full_name: format!("{org}/{}", repo.name),
            url: format!("https://github.com/{org}/{}", repo.name),
        })
    }

    async fn delete_repo(&self, org: &str, name: &str) -> Result<(), ControlError> {
        self.pause().await;
        self.record(format!("delete_repo {org} {name}"));
        Ok(())
    }

    async fn secret_public_key(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<SecretPublicKey, ControlError> {
        self.pause().await;
        self.record(format!("secret_public_key {org}/{repo}"));
        Ok(SecretPublicKey {
            key_id: "568250167242549743".to_string(),
            key: BASE64.encode(self.state.secret_key.public_key().as_bytes()),
        })
    }

    async fn put_secret(
        &self,
        org: &str,
        repo: &str,
        name: &str,
        secret: &SealedSecret,
    ) -> Result<(), ControlError> {
        self.pause().await;
        if self.state.fail_secret_uploads.load(Ordering::SeqCst) {
            return Err(ControlError::Upstream(
                "secret upload returned 403 Forbidden".to_string(),
            ));
        }
        self.record(format!(
            "put_secret {org}/{repo} {name} {}",
            secret.encrypted_value
        ));
        Ok(())
    }

    async fn delete_secret(&self, org: &str, repo: &str, name: &str) -> Result<(), ControlError> {
        self.pause().await;
        self.record(format!("delete_secret {org}/{repo} {name}"));
        Ok(())
    }

    async fn add_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError> {
        self.pause().await;
        self.record(format!("add_team_member {org}/{team} {username}"));
        self.state
            .teams
            .lock()
            .unwrap()
            .entry(format!("{org}/{team}"))
            .or_default()
            .insert(username.to_string());
        Ok(())
    }

    async fn remove_team_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<(), ControlError> {
        self.pause().await;
        self.record(format!("remove_team_member {org}/{team} {username}"));
        self.state
            .teams
            .lock()
            .unwrap()
            .entry(format!("{org}/{team}"))
            .or_default()
            .remove(username);
        Ok(())
    }

    async fn list_user_teams(
        &self,
        org: &str,
        username: &str,
    ) -> Result<Vec<String>, ControlError> {
        self.pause().await;
        if self.state.fail_memberships.load(Ordering::SeqCst) {
            return Err(ControlError::Upstream(
                "team listing returned 502 Bad Gateway".to_string(),
            ));
        }
        self.state.membership_lookups.fetch_add(1, Ordering::SeqCst);

        let prefix = format!("{org}/");
        let teams = self.state.teams.lock().unwrap();
        Ok(teams
            .iter()
            .filter(|(key, members)| key.starts_with(&prefix) && members.contains(username))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect())
    }

    async fn team_has_member(
        &self,
        org: &str,
        team: &str,
        username: &str,
    ) -> Result<bool, ControlError> {
        self.pause().await;
        if self.state.fail_memberships.load(Ordering::SeqCst) {
            return Err(ControlError::Upstream(
                "team membership check returned 502 Bad Gateway".to_string(),
            ));
        }
        let teams = self.state.teams.lock().unwrap();
        Ok(teams
            .get(&format!("{org}/{team}"))
            .is_some_and(|members| members.contains(username)))
    }

    async fn list_repos(&self, org: &str) -> Result<Vec<String>, ControlError> {
        self.pause().await;
        let repos = self.state.repos.lock().unwrap();
        Ok(repos.get(org).cloned().unwrap_or_default())
    }
}
