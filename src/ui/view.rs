//! Sign-in/out view
//!
//! A small state machine over the current session plus its HTML rendering.
//!
//! ```text
//! Pending ──resolve(Some)──▶ Authenticated ──begin_sign_out──▶ Pending ──finish_sign_out──▶ Unauthenticated
//!    └──────resolve(None)──▶ Unauthenticated ──begin_sign_in──▶ Unauthenticated(loading)
//!                                  ▲                                   │
//!                                  └──────finish_sign_in(Err)──────────┘
//! ```

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::auth::{SessionPayload, SignInRedirect};
use crate::client::{AuthApi, ClientError};

/// Provider behind the sign-in button
pub const SIGN_IN_PROVIDER: &str = "github";

/// Fallback when the provider gives no message
pub const SIGN_IN_FAILED: &str = "GitHub sign in failed";

/// Fallback when the call itself failed
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Form targets used by the rendered buttons
#[derive(Debug, Clone, Copy)]
pub struct ViewRoutes {
    pub sign_in: &'static str,
    pub sign_out: &'static str,
}

/// What the view currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    /// Session read in flight
    Pending,
    Authenticated(Box<SessionPayload>),
    Unauthenticated {
        error: Option<String>,
        /// Sign-in request in flight; the button is disabled
        loading: bool,
    },
}

/// Why a sign-in attempt failed
#[derive(Debug, Clone, PartialEq)]
pub enum SignInFailure {
    /// The auth provider answered with an error, possibly without a message
    Rejected(Option<String>),
    /// The call did not complete
    Unexpected,
}

impl SignInFailure {
    /// Message shown to the user
    pub fn message(&self) -> String {
        match self {
            SignInFailure::Rejected(Some(message)) if !message.is_empty() => message.clone(),
            SignInFailure::Rejected(_) => SIGN_IN_FAILED.to_string(),
            SignInFailure::Unexpected => UNEXPECTED_ERROR.to_string(),
        }
    }
}

impl From<ClientError> for SignInFailure {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Api { message, .. } => SignInFailure::Rejected(message),
            ClientError::Transport(_) => SignInFailure::Unexpected,
        }
    }
}

/// The sign-in/out view
#[derive(Debug, Clone)]
pub struct SignInView {
    state: ViewState,
    routes: ViewRoutes,
}

impl SignInView {
    /// New view waiting for the session read
    pub fn new(routes: ViewRoutes) -> Self {
        Self {
            state: ViewState::Pending,
            routes,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Apply the result of a session read
    pub fn resolve_session(&mut self, session: Option<SessionPayload>) {
        self.state = match session {
            Some(session) => ViewState::Authenticated(Box::new(session)),
            None => ViewState::Unauthenticated {
                error: None,
                loading: false,
            },
        };
    }

    /// Sign-in button clicked
    ///
    /// Clears the previous error and disables the button.
    ///
    /// # Returns
    /// `false` when ignored: not signed out, or a sign-in is already running
    pub fn begin_sign_in(&mut self) -> bool {
        match &self.state {
            ViewState::Unauthenticated { loading: false, .. } => {
                self.state = ViewState::Unauthenticated {
                    error: None,
                    loading: true,
                };
                true
            }
            _ => false,
        }
    }

    /// Apply the outcome of the sign-in call
    ///
    /// # Returns
    /// The provider URL to navigate to on success
    pub fn finish_sign_in(
        &mut self,
        outcome: Result<SignInRedirect, SignInFailure>,
    ) -> Option<String> {
        if !matches!(self.state, ViewState::Unauthenticated { loading: true, .. }) {
            return None;
        }

        match outcome {
            Ok(redirect) => {
                self.state = ViewState::Unauthenticated {
                    error: None,
                    loading: false,
                };
                Some(redirect.url)
            }
            Err(failure) => {
                self.state = ViewState::Unauthenticated {
                    error: Some(failure.message()),
                    loading: false,
                };
                None
            }
        }
    }

    /// Show an error reported outside a sign-in call (e.g. the OAuth callback)
    pub fn show_error(&mut self, message: impl Into<String>) {
        if let ViewState::Unauthenticated { loading: false, .. } = self.state {
            self.state = ViewState::Unauthenticated {
                error: Some(message.into()),
                loading: false,
            };
        }
    }

    /// Sign-out button clicked
    pub fn begin_sign_out(&mut self) -> bool {
        if matches!(self.state, ViewState::Authenticated(_)) {
            self.state = ViewState::Pending;
            true
        } else {
            false
        }
    }

    /// Sign-out finished; the session is gone
    pub fn finish_sign_out(&mut self) {
        if self.state == ViewState::Pending {
            self.resolve_session(None);
        }
    }

    // =========================================================================
    // Driving the view through an auth API
    // =========================================================================

    /// Read the session and resolve the view
    ///
    /// A failed read shows the signed-out view.
    pub async fn load<A: AuthApi + ?Sized>(&mut self, api: &A) {
        let session = match api.get_session().await {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(%error, "Session read failed");
                None
            }
        };
        self.resolve_session(session);
    }

    /// Run a sign-in through `api`
    ///
    /// # Returns
    /// The provider URL to navigate to on success
    pub async fn sign_in_with<A: AuthApi + ?Sized>(
        &mut self,
        api: &A,
        callback_url: &str,
    ) -> Option<String> {
        if !self.begin_sign_in() {
            return None;
        }
        let outcome = api
            .sign_in_social(SIGN_IN_PROVIDER, callback_url)
            .await
            .map_err(SignInFailure::from);
        self.finish_sign_in(outcome)
    }

    /// Run a sign-out through `api`
    pub async fn sign_out_with<A: AuthApi + ?Sized>(&mut self, api: &A) {
        if !self.begin_sign_out() {
            return;
        }
        if let Err(error) = api.sign_out().await {
            tracing::warn!(%error, "Sign-out request failed");
        }
        self.finish_sign_out();
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render the view body
    pub fn render(&self) -> String {
        match &self.state {
            ViewState::Pending => render_pending(),
            ViewState::Authenticated(session) => self.render_authenticated(session),
            ViewState::Unauthenticated { error, loading } => {
                self.render_unauthenticated(error.as_deref(), *loading)
            }
        }
    }

    fn render_authenticated(&self, session: &SessionPayload) -> String {
        let user = &session.user;
        let email = encode_text(&user.email);
        let name = encode_text(&user.name);

        format!(
            r#"<div class="page">
<div class="card stack">
{session_box}
<div>
<h1>Welcome back</h1>
<p class="muted">You're signed in as {email}</p>
</div>
<div class="profile">
{avatar}
<div class="profile-text">
<p class="name">{name}</p>
<p class="muted small">{email}</p>
</div>
</div>
<form method="post" action="{sign_out}">
<button type="submit" class="button">Sign out</button>
</form>
{footer}
</div>
</div>"#,
            session_box = render_session_box(Some(session)),
            avatar = render_avatar(user.image.as_deref(), &user.name),
            sign_out = self.routes.sign_out,
            footer = FOOTER,
        )
    }

    fn render_unauthenticated(&self, error: Option<&str>, loading: bool) -> String {
        let error_box = error
            .map(|message| {
                format!(
                    r#"<div class="error" role="alert"><p>{}</p></div>"#,
                    encode_text(message)
                )
            })
            .unwrap_or_default();

        let (button, pending_template) = if loading {
            (render_busy_button(), String::new())
        } else {
            (
                r#"<button type="submit" class="button">Continue with GitHub</button>"#.to_string(),
                format!(
                    r#"<template id="sign-in-pending">{}</template>"#,
                    render_busy_button()
                ),
            )
        };

        format!(
            r#"<div class="page">
<div class="card">
{session_box}
<h1>Sign in</h1>
<p class="muted intro">Use GitHub to log in to your account.</p>
{error_box}
<form method="post" action="{sign_in}" data-pending-template="sign-in-pending">
{button}
</form>
{pending_template}
{footer}
</div>
</div>"#,
            session_box = render_session_box(None),
            sign_in = self.routes.sign_in,
            footer = FOOTER,
        )
    }
}

const FOOTER: &str = r#"<p class="footer">Built with <a href="https://github.com/tokio-rs/axum" target="_blank" rel="noopener noreferrer">AXUM</a>.</p>"#;

fn render_pending() -> String {
    r#"<div class="center"><div class="spinner" role="status" aria-label="Loading"></div></div>"#
        .to_string()
}

fn render_busy_button() -> String {
    r#"<button type="submit" class="button" disabled><span class="button-busy"><span class="spinner small"></span><span>Please wait</span></span></button>"#
        .to_string()
}

fn render_session_box(session: Option<&SessionPayload>) -> String {
    let json = serde_json::to_string_pretty(&session).unwrap_or_else(|_| "null".to_string());
    format!(
        r#"<div class="session-box">
<p class="label">Session</p>
<pre>{}</pre>
</div>"#,
        encode_text(&json)
    )
}

fn render_avatar(image: Option<&str>, name: &str) -> String {
    match image.filter(|url| !url.is_empty()) {
        Some(url) => format!(
            r#"<img src="{}" alt="" class="avatar">"#,
            encode_double_quoted_attribute(url)
        ),
        None => format!(
            r#"<div class="avatar avatar-fallback"><span>{}</span></div>"#,
            encode_text(&initial(name))
        ),
    }
}

/// First letter of the name, uppercased; "U" when there is none
fn initial(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "U".to_string())
}
