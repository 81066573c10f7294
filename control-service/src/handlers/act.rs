use axum::{Json, extract::State};
use serde_json::{Value, json};
use service_core::error::AppError;
use validator::Validate;

use crate::AppState;
use crate::middleware::CurrentUser;
use crate::models::{ActionKind, ActionRequest, Identity, NormalizedAction};
use crate::services::ControlError;

/// Dispatch a platform action on behalf of the authenticated operator.
///
/// POST /act
#[tracing::instrument(
    skip(state, identity, request),
    fields(org = %request.org, action = %request.action, user = %identity.email)
)]
pub async fn act(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(request): Json<ActionRequest>,
) -> Result<Json<Value>, AppError> {
    // Shape and policy failures reject before anything is audited.
    request.validate()?;

    let kind = match request.action.parse::<ActionKind>() {
        Ok(kind) => kind,
        Err(err) => {
            // Unknown kinds are auditable: the attempt names a real operator
            // and org even though no handler exists for it.
            record_attempt(&state, &identity, &request, &err.audit_result()).await?;
            return Err(err.into());
        }
    };

    let normalized = state.policy.normalize(kind, &request, &identity)?;

    // The rest of the pipeline runs in a spawned task: a caller that
    // disconnects cannot cancel an upstream mutation already underway, and
    // the audit record is written either way.
    let pipeline = tokio::spawn(run_pipeline(state.clone(), identity, request, normalized));

    match pipeline.await {
        Ok(result) => result.map(Json),
        Err(err) => Err(AppError::InternalError(anyhow::anyhow!(
            "action pipeline task failed: {err}"
        ))),
    }
}

async fn run_pipeline(
    state: AppState,
    identity: Identity,
    request: ActionRequest,
    normalized: NormalizedAction,
) -> Result<Value, AppError> {
    match execute(&state, &identity, &normalized).await {
        Ok(details) => {
            record_attempt(&state, &identity, &request, "success").await?;
            Ok(json!({ "status": "ok", "details": details }))
        }
        Err(err) => {
            record_attempt(&state, &identity, &request, &err.audit_result()).await?;
            Err(err.into())
        }
    }
}

async fn execute(
    state: &AppState,
    identity: &Identity,
    action: &NormalizedAction,
) -> Result<Value, ControlError> {
    let client = state.broker.get_client(&action.org).await?;
    state.authz.authorize(action, identity).await?;
    state.dispatcher.dispatch(client, action).await
}

async fn record_attempt(
    state: &AppState,
    identity: &Identity,
    request: &ActionRequest,
    result: &str,
) -> Result<(), AppError> {
    let parameters = serde_json::to_string(&request.parameters).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("failed to serialize parameters: {e}"))
    })?;

    state
        .ledger
        .record(
            identity,
            &request.action,
            &request.org,
            request.repo.as_deref(),
            &parameters,
            result,
        )
        .await
}
