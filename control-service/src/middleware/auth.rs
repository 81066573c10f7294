use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::AppState;
use crate::models::Identity;

/// Require a valid session and stash the operator identity in request
/// extensions. A missing token is 401; an invalid or expired one is 403.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(req.headers());
    let token = jar
        .get(state.sessions.cookie_name())
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    let token =
        token.ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing session token")))?;

    let identity = state.sessions.validate(&token)?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extractor handing handlers the authenticated identity.
pub struct CurrentUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<Identity>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Identity missing from request extensions"))
        })?;

        Ok(CurrentUser(identity.clone()))
    }
}
