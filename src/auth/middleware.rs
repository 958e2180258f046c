//! Authentication middleware
//!
//! Protects routes that require a signed-in user.

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use super::session::SessionPayload;
use crate::AppState;
use crate::error::AppError;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

/// Middleware to require authentication
///
/// Accepts the session cookie or a signed session token as
/// `Authorization: Bearer`. Adds the session to request extensions.
/// Cookie changes from the session read (refresh, cache, removal) are
/// sent back with the response.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = bearer_token(request.headers()) {
        let session = state
            .auth
            .session_from_signed_token(&token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        request.extensions_mut().insert(session);
        return Ok(next.run(request).await);
    }

    let jar = CookieJar::from_headers(request.headers());
    let (jar, session) = state.auth.get_session(jar, false).await?;
    let Some(session) = session else {
        return Ok((jar, AppError::Unauthorized).into_response());
    };

    request.extensions_mut().insert::<SessionPayload>(session);
    Ok((jar, next.run(request).await).into_response())
}
