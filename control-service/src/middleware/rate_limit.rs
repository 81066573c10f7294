use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::check_keyed;

use crate::AppState;
use crate::models::Identity;

/// Per-identity quota on the action surface. Runs after session
/// authentication, keyed by the operator's email.
pub async fn action_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(identity) = request.extensions().get::<Identity>() else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing session token"
        )));
    };

    match check_keyed(
        &state.act_rate_limiter,
        &identity.email,
        state.config.rate_limit.act_per_minute,
        60,
    ) {
        Ok(()) => Ok(next.run(request).await),
        Err(wait) => Err(AppError::TooManyRequests(
            "Action rate limit exceeded. Please try again later.".to_string(),
            Some(wait),
        )),
    }
}
