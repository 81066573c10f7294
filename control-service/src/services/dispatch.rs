use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::timeout;

use crate::models::{ActionParams, NormalizedAction};
use crate::platform::{NewRepository, PlatformClient};

use super::error::ControlError;
use super::seal;

/// Maps normalized actions onto the platform capability surface.
///
/// The match over `ActionParams` is exhaustive, so adding an action kind
/// without a handler fails to compile. Every upstream call is bounded by the
/// configured timeout and fails as an upstream error instead of hanging the
/// request.
pub struct ActionDispatcher {
    upstream_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(upstream_timeout: Duration) -> Self {
        Self { upstream_timeout }
    }

    pub async fn dispatch(
        &self,
        client: Arc<dyn PlatformClient>,
        action: &NormalizedAction,
    ) -> Result<Value, ControlError> {
        match &action.params {
            ActionParams::CreateRepo {
                name,
                private,
                description,
            } => {
                let repo = self
                    .bounded(
                        "repository creation",
                        client.create_repo(
                            &action.org,
                            &NewRepository {
                                name: name.clone(),
                                private: *private,
                                description: description.clone(),
                            },
                        ),
                    )
                    .await?;
                Ok(json!({ "status": "created", "url": repo.url }))
            }
            ActionParams::DeleteRepo { name } => {
                self.bounded("repository deletion", client.delete_repo(&action.org, name))
                    .await?;
                Ok(json!({ "status": "deleted", "repo": name }))
            }
            ActionParams::ReplaceSecret { name, value } => {
                let repo = target_repo(action)?;
                let public_key = self
                    .bounded(
                        "secret public key fetch",
                        client.secret_public_key(&action.org, repo),
                    )
                    .await?;
                let sealed = seal::seal_secret(&public_key, value)?;
                self.bounded(
                    "secret upload",
                    client.put_secret(&action.org, repo, name, &sealed),
                )
                .await?;
                Ok(json!({ "status": "secret replaced", "secret": name }))
            }
            ActionParams::DeleteSecret { name } => {
                let repo = target_repo(action)?;
                self.bounded(
                    "secret deletion",
                    client.delete_secret(&action.org, repo, name),
                )
                .await?;
                Ok(json!({ "status": "secret deleted", "secret": name }))
            }
            ActionParams::AddUserToTeam { username } => {
                self.bounded(
                    "team membership add",
                    client.add_team_member(&action.org, &action.team, username),
                )
                .await?;
                Ok(json!({ "status": "user added", "team": action.team, "user": username }))
            }
            ActionParams::RemoveUserFromTeam { username } => {
                self.bounded(
                    "team membership removal",
                    client.remove_team_member(&action.org, &action.team, username),
                )
                .await?;
                Ok(json!({ "status": "user removed", "team": action.team, "user": username }))
            }
        }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, ControlError>>,
    ) -> Result<T, ControlError> {
        timeout(self.upstream_timeout, call)
            .await
            .map_err(|_| ControlError::Upstream(format!("{what} timed out")))?
    }
}

fn target_repo(action: &NormalizedAction) -> Result<&str, ControlError> {
    action.repo.as_deref().ok_or_else(|| {
        ControlError::Validation(format!("`repo` is required for {}", action.kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use crate::platform::FakePlatform;
    use secrecy::SecretString;

    fn dispatcher() -> ActionDispatcher {
        ActionDispatcher::new(Duration::from_secs(5))
    }

    fn client(fake: &FakePlatform) -> Arc<dyn PlatformClient> {
        use crate::platform::PlatformConnector;
        fake.client_for(&SecretString::new("ghs_test".to_string()))
    }

    fn org_action(kind: ActionKind, team: &str, params: ActionParams) -> NormalizedAction {
        NormalizedAction {
            org: "acme".to_string(),
            repo: None,
            kind,
            team: team.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn create_repo_targets_the_org_scope() {
        let fake = FakePlatform::new();
        let action = org_action(
            ActionKind::CreateRepo,
            "infrastructure-admins",
            ActionParams::CreateRepo {
                name: "dev-test".to_string(),
                private: true,
                description: "d".to_string(),
            },
        );

        let details = dispatcher().dispatch(client(&fake), &action).await.unwrap();

        assert_eq!(details["status"], "created");
        assert_eq!(fake.calls(), vec!["create_repo acme dev-test private=true"]);
    }

    #[tokio::test]
    async fn replace_secret_seals_then_uploads_on_the_repo_scope() {
        let fake = FakePlatform::new();
        let action = NormalizedAction {
            org: "acme".to_string(),
            repo: Some("x".to_string()),
            kind: ActionKind::ReplaceSecret,
            team: "infrastructure-admins".to_string(),
            params: ActionParams::ReplaceSecret {
                name: "MCP_TOKEN".to_string(),
                value: "hunter2".to_string(),
            },
        };

        let details = dispatcher().dispatch(client(&fake), &action).await.unwrap();

        assert_eq!(details["status"], "secret replaced");
        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "secret_public_key acme/x");
        assert!(calls[1].starts_with("put_secret acme/x MCP_TOKEN"));
        // The uploaded value is the sealed ciphertext, not the plaintext.
        assert!(!calls[1].contains("hunter2"));
    }

    #[tokio::test]
    async fn secret_upload_failures_are_surfaced_not_swallowed() {
        let fake = FakePlatform::new();
        fake.fail_secret_uploads(true);
        let action = NormalizedAction {
            org: "acme".to_string(),
            repo: Some("x".to_string()),
            kind: ActionKind::ReplaceSecret,
            team: "infrastructure-admins".to_string(),
            params: ActionParams::ReplaceSecret {
                name: "MCP_TOKEN".to_string(),
                value: "hunter2".to_string(),
            },
        };

        let err = dispatcher()
            .dispatch(client(&fake), &action)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Upstream(_)));
    }

    #[tokio::test]
    async fn team_membership_changes_use_the_normalized_team() {
        let fake = FakePlatform::new();
        let action = org_action(
            ActionKind::AddUserToTeam,
            "platform",
            ActionParams::AddUserToTeam {
                username: "bob".to_string(),
            },
        );

        let details = dispatcher().dispatch(client(&fake), &action).await.unwrap();

        assert_eq!(details["status"], "user added");
        assert_eq!(fake.calls(), vec!["add_team_member acme/platform bob"]);
    }

    #[tokio::test]
    async fn slow_upstream_calls_time_out_as_upstream_errors() {
        let fake = FakePlatform::new();
        fake.set_call_delay(Duration::from_millis(50));
        let dispatcher = ActionDispatcher::new(Duration::from_millis(10));
        let action = org_action(
            ActionKind::DeleteRepo,
            "infrastructure-admins",
            ActionParams::DeleteRepo {
                name: "dev-old".to_string(),
            },
        );

        let err = dispatcher
            .dispatch(client(&fake), &action)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Upstream(_)));
    }
}
