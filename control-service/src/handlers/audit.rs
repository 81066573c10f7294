use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::AppState;
use crate::middleware::CurrentUser;
use crate::models::AuditEntryResponse;
use crate::services::AuditFilter;

/// Query params for the audit surface.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub email: Option<String>,
    pub action: Option<String>,
    pub org: Option<String>,
    pub repo: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Query audit entries, newest first (org admins only).
///
/// GET /audit
#[tracing::instrument(skip(state, identity, query), fields(user = %identity.email))]
pub async fn audit_logs(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntryResponse>>, AppError> {
    let org = query
        .org
        .clone()
        .filter(|org| !org.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("`org` parameter is required")))?;

    if !state
        .broker
        .is_org_admin(&org, identity.username())
        .await
    {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Audit access requires org admin standing"
        )));
    }

    let entries = state
        .ledger
        .query(&AuditFilter {
            email: query.email,
            action: query.action,
            org: Some(org),
            repo: query.repo,
            limit: query.limit.clamp(1, 1000),
            offset: query.offset.max(0),
        })
        .await?;

    Ok(Json(
        entries.into_iter().map(AuditEntryResponse::from).collect(),
    ))
}
