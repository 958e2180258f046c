//! Auth HTTP endpoints
//!
//! Mounted under `/api/auth`. These are what the client SDK and the demo
//! page talk to.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::service::{
    AUTH_BASE_PATH, CallbackQuery, RequestMeta, SignInRedirect, SignInSocialRequest, append_query,
};
use crate::AppState;
use crate::error::AppError;
use crate::ui;

/// Create authentication router
///
/// Routes:
/// - GET /ok - Liveness of the auth endpoints
/// - GET /get-session - Current session or `null`
/// - POST /sign-in/social - Start a social sign-in
/// - GET /callback/:provider - OAuth callback
/// - POST /sign-out - Sign out
/// - GET /error - Human readable sign-in error page
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/ok", get(ok))
        .route("/get-session", get(get_session))
        .route("/sign-in/social", post(sign_in_social))
        .route("/callback/:provider", get(callback))
        .route("/sign-out", post(sign_out))
        .route("/error", get(error_page))
}

async fn ok() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GetSessionQuery {
    #[serde(rename = "disableCookieCache", default)]
    disable_cookie_cache: bool,
}

/// GET /api/auth/get-session
///
/// Responds with the session payload, or `null` when signed out.
async fn get_session(
    State(state): State<AppState>,
    Query(query): Query<GetSessionQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, session) = state
        .auth
        .get_session(jar, query.disable_cookie_cache)
        .await?;
    Ok((jar, Json(session)))
}

// =============================================================================
// Social sign-in
// =============================================================================

/// POST /api/auth/sign-in/social
///
/// Body: `{"provider": "github", "callbackURL": "/demo/auth"}`
async fn sign_in_social(
    State(state): State<AppState>,
    Json(request): Json<SignInSocialRequest>,
) -> Result<Json<SignInRedirect>, AppError> {
    let redirect = state.auth.sign_in_social(request).await?;
    Ok(Json(redirect))
}

/// GET /api/auth/callback/:provider
///
/// # Steps
/// 1. Consume the stored OAuth state
/// 2. Exchange code for tokens (PKCE)
/// 3. Fetch the provider profile and find or create the user
/// 4. Create session and set cookies
/// 5. Redirect to the callback URL
///
/// A missing or stale state cannot be tied to a callback URL, so it
/// redirects to the error page.
async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    let meta = request_meta(&headers);
    match state
        .auth
        .handle_callback(&provider, query, meta, jar.clone())
        .await
    {
        Ok((jar, location)) => (jar, Redirect::to(&location)),
        Err(error) => {
            tracing::warn!(%provider, %error, "OAuth callback rejected");
            let code = match error {
                AppError::InvalidState => "please_restart_the_process".to_string(),
                other => other.code().to_ascii_lowercase(),
            };
            let location = append_query(&format!("{AUTH_BASE_PATH}/error"), "error", &code);
            (jar, Redirect::to(&location))
        }
    }
}

// =============================================================================
// Sign-out
// =============================================================================

/// POST /api/auth/sign-out
///
/// Deletes the session and expires the auth cookies.
async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let jar = state.auth.sign_out(jar).await?;
    Ok((jar, Json(serde_json::json!({ "success": true }))))
}

// =============================================================================
// Error page
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ErrorQuery {
    error: Option<String>,
}

/// GET /api/auth/error
async fn error_page(Query(query): Query<ErrorQuery>) -> Html<String> {
    Html(ui::error_page(query.error.as_deref().unwrap_or("unknown")))
}

// =============================================================================
// Helpers
// =============================================================================

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };

    RequestMeta {
        ip_address: header("x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: header("user-agent"),
    }
}
