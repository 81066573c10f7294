use std::sync::Arc;

use crate::models::{Identity, NormalizedAction};

use super::broker::CredentialBroker;
use super::error::ControlError;

/// Permits an action only when the caller belongs to the required team or to
/// one of the organization's admin teams.
///
/// Fail-closed: any credential or membership resolution failure during the
/// check denies the request.
pub struct AuthorizationGate {
    broker: Arc<CredentialBroker>,
}

impl AuthorizationGate {
    pub fn new(broker: Arc<CredentialBroker>) -> Self {
        Self { broker }
    }

    pub async fn authorize(
        &self,
        action: &NormalizedAction,
        identity: &Identity,
    ) -> Result<(), ControlError> {
        let username = identity.username();

        match self.broker.membership(username, &action.org).await {
            Ok(fact) if fact.teams.contains(&action.team) => return Ok(()),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    org = %action.org,
                    user = username,
                    error = %err,
                    "Membership lookup failed during authorization; denying"
                );
            }
        }

        if self.broker.is_org_admin(&action.org, username).await {
            return Ok(());
        }

        Err(ControlError::Authorization(format!(
            "user {username} is not in team {} for org {}",
            action.team, action.org
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::super::cache::testing::ManualClock;
    use super::*;
    use crate::models::{ActionKind, ActionParams};
    use crate::platform::FakePlatform;
    use chrono::Utc;
    use std::time::Duration;

    fn gate(fake: &FakePlatform) -> AuthorizationGate {
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(fake.clone()),
            ManualClock::new(Utc::now()),
            Duration::from_secs(300),
            256,
            Duration::from_secs(5),
            vec!["owners".to_string(), "mcp-auditors".to_string()],
        ));
        AuthorizationGate::new(broker)
    }

    fn action(team: &str) -> NormalizedAction {
        NormalizedAction {
            org: "acme".to_string(),
            repo: None,
            kind: ActionKind::DeleteRepo,
            team: team.to_string(),
            params: ActionParams::DeleteRepo {
                name: "dev-old".to_string(),
            },
        }
    }

    fn identity(email: &str) -> Identity {
        Identity {
            subject: "sub".to_string(),
            email: email.to_string(),
            name: "Operator".to_string(),
            expiry: Utc::now(),
        }
    }

    #[tokio::test]
    async fn members_of_the_required_team_are_allowed() {
        let fake = FakePlatform::new();
        fake.grant_team("acme", "infrastructure-admins", "alice");

        let result = gate(&fake)
            .authorize(&action("infrastructure-admins"), &identity("alice@example.com"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn org_admins_are_allowed_without_team_membership() {
        let fake = FakePlatform::new();
        fake.grant_team("acme", "owners", "root");

        let result = gate(&fake)
            .authorize(&action("infrastructure-admins"), &identity("root@example.com"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn outsiders_are_denied() {
        let fake = FakePlatform::new();

        let err = gate(&fake)
            .authorize(&action("infrastructure-admins"), &identity("mallory@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Authorization(_)));
    }

    #[tokio::test]
    async fn credential_failures_deny_rather_than_allow() {
        let fake = FakePlatform::new();
        fake.grant_team("acme", "infrastructure-admins", "alice");
        fake.fail_installations(true);

        let err = gate(&fake)
            .authorize(&action("infrastructure-admins"), &identity("alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Authorization(_)));
    }

    #[tokio::test]
    async fn membership_lookup_failures_deny_rather_than_allow() {
        let fake = FakePlatform::new();
        fake.grant_team("acme", "infrastructure-admins", "alice");
        fake.fail_memberships(true);

        let err = gate(&fake)
            .authorize(&action("infrastructure-admins"), &identity("alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Authorization(_)));
    }
}
