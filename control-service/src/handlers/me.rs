use axum::{Json, extract::State};
use serde_json::{Value, json};
use service_core::error::AppError;

use crate::AppState;
use crate::middleware::CurrentUser;

/// Per-org identity report: team memberships, visible repositories,
/// installation token metadata and admin standing. Token values themselves
/// never appear here.
///
/// GET /me
#[tracing::instrument(skip(state, identity), fields(user = %identity.email))]
pub async fn identity_report(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<Value>, AppError> {
    let username = identity.username().to_string();

    let mut github = serde_json::Map::new();
    let mut flags = serde_json::Map::new();

    for org in &state.config.github.orgs {
        let teams: Vec<String> = match state.broker.membership(&username, org).await {
            Ok(fact) => {
                let mut teams: Vec<String> = fact.teams.into_iter().collect();
                teams.sort();
                teams
            }
            Err(err) => {
                tracing::warn!(org = %org, error = %err, "Membership lookup failed for identity report");
                Vec::new()
            }
        };

        let repos = state.broker.installation_repos(org).await.unwrap_or_default();

        let token = match state.broker.token_metadata(org).await {
            Ok((expires_at, permissions)) => json!({
                "expires_at": expires_at,
                "permissions": permissions,
            }),
            Err(err) => {
                tracing::warn!(org = %org, error = %err, "Token metadata unavailable for identity report");
                json!({ "error": "installation token unavailable" })
            }
        };

        let is_admin = state.broker.is_org_admin(org, &username).await;

        github.insert(
            org.clone(),
            json!({
                "teams": teams,
                "accessible_repos": repos,
                "token": token,
            }),
        );
        flags.insert(org.clone(), json!({ "is_admin": is_admin }));
    }

    Ok(Json(json!({
        "email": identity.email,
        "name": identity.name,
        "username": username,
        "github": github,
        "flags": flags,
    })))
}
