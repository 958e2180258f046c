//! Demo page routes
//!
//! Server-rendered version of the sign-in view. Each request resolves the
//! session first, so the pending state only exists between a form submit and
//! the next response.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::shell::{STYLESHEET_PATH, document, stylesheet};
use super::view::{SIGN_IN_PROVIDER, SignInFailure, SignInView, ViewRoutes};
use crate::AppState;
use crate::auth::SignInSocialRequest;

/// Path of the demo page
pub const DEMO_PATH: &str = "/demo/auth";

const ROUTES: ViewRoutes = ViewRoutes {
    sign_in: "/demo/auth/sign-in",
    sign_out: "/demo/auth/sign-out",
};

/// Create demo router
///
/// Routes:
/// - GET / - Redirect to the demo page
/// - GET /demo/auth - Sign-in/out view
/// - POST /demo/auth/sign-in - Start GitHub sign-in
/// - POST /demo/auth/sign-out - Sign out
/// - GET /styles.css - Stylesheet
pub fn demo_router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to(DEMO_PATH) }))
        .route(DEMO_PATH, get(demo_page))
        .route(ROUTES.sign_in, post(sign_in))
        .route(ROUTES.sign_out, post(sign_out))
        .route(STYLESHEET_PATH, get(stylesheet))
}

#[derive(Debug, Default, Deserialize)]
struct DemoQuery {
    error: Option<String>,
}

/// GET /demo/auth
///
/// `?error=` is set when the OAuth callback redirected back with a failure.
async fn demo_page(
    State(state): State<AppState>,
    Query(query): Query<DemoQuery>,
    jar: CookieJar,
) -> Response {
    let mut view = SignInView::new(ROUTES);
    let jar = match state.auth.get_session(jar.clone(), false).await {
        Ok((jar, session)) => {
            view.resolve_session(session);
            jar
        }
        Err(error) => {
            tracing::warn!(%error, "Session read failed");
            view.resolve_session(None);
            jar
        }
    };

    if let Some(error) = query.error.filter(|error| !error.is_empty()) {
        view.show_error(SignInFailure::Rejected(Some(error)).message());
    }

    (jar, Html(document(&view.render()))).into_response()
}

/// POST /demo/auth/sign-in
///
/// Redirects to GitHub, or re-renders the view with the error.
async fn sign_in(State(state): State<AppState>) -> Response {
    let request = SignInSocialRequest {
        provider: SIGN_IN_PROVIDER.to_string(),
        callback_url: Some(DEMO_PATH.to_string()),
        error_callback_url: Some(DEMO_PATH.to_string()),
    };

    let mut view = SignInView::new(ROUTES);
    view.resolve_session(None);
    view.begin_sign_in();

    match state.auth.sign_in_social(request).await {
        Ok(redirect) => match view.finish_sign_in(Ok(redirect)) {
            Some(url) => Redirect::to(&url).into_response(),
            None => (StatusCode::OK, Html(document(&view.render()))).into_response(),
        },
        Err(error) => {
            tracing::warn!(%error, "Demo sign-in failed");
            let status = error.status();
            view.finish_sign_in(Err(SignInFailure::Rejected(Some(error.public_message()))));
            (status, Html(document(&view.render()))).into_response()
        }
    }
}

/// POST /demo/auth/sign-out
async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = match state.auth.sign_out(jar.clone()).await {
        Ok(jar) => jar,
        Err(error) => {
            tracing::warn!(%error, "Demo sign-out failed");
            state.auth.cookie_settings().clear(jar)
        }
    };
    (jar, Redirect::to(DEMO_PATH)).into_response()
}
