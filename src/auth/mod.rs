//! GitHub sign-in and sessions
//!
//! Handles:
//! - Social provider registry (GitHub OAuth)
//! - Session issuance, lookup and the signed cookie cache
//! - The `/api/auth` endpoints
//! - Authentication middleware

mod cookies;
mod middleware;
mod oauth;
pub mod provider;
mod service;
pub mod session;

pub use cookies::CookieSettings;
pub use middleware::require_auth;
pub use oauth::auth_router;
pub use provider::{ProviderRegistry, SocialProfile, SocialProvider};
pub use service::{
    AUTH_BASE_PATH, AuthService, CallbackQuery, RequestMeta, SignInRedirect, SignInSocialRequest,
};
pub use session::{SessionPayload, sign_value, verify_signed_value};
