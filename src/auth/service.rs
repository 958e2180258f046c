//! Auth provider: sign-in, callback, session reads and sign-out
//!
//! Every operation takes the request's `CookieJar` and hands back the jar
//! with whatever cookie changes the operation implies.

use std::sync::Arc;

use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::cookies::CookieSettings;
use super::provider::{ProviderRegistry, ProviderTokens, SocialProfile};
use super::session::{
    CookieCache, SessionPayload, generate_session_token, sign_value, verify_signed_value,
};
use crate::config::{AppConfig, SessionConfig};
use crate::data::{Account, Database, EntityId, Session, User, Verification};
use crate::error::AppError;
use crate::metrics::{SESSION_LOOKUPS_TOTAL, SIGN_INS_TOTAL, SIGN_OUTS_TOTAL};

/// Route prefix of the auth endpoints
pub const AUTH_BASE_PATH: &str = "/api/auth";

/// How long an OAuth state value stays valid
const STATE_TTL_MINUTES: i64 = 10;

/// Body of `POST /api/auth/sign-in/social`
#[derive(Debug, Clone, Deserialize)]
pub struct SignInSocialRequest {
    pub provider: String,
    #[serde(rename = "callbackURL", default)]
    pub callback_url: Option<String>,
    #[serde(rename = "errorCallbackURL", default)]
    pub error_callback_url: Option<String>,
}

/// Where the browser goes to continue a social sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInRedirect {
    pub url: String,
    pub redirect: bool,
}

/// Data kept server-side between the redirect and the callback
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthStateData {
    provider: String,
    code_verifier: String,
    callback_url: String,
    error_callback_url: Option<String>,
}

/// Query of `GET /api/auth/callback/{provider}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Client details recorded on new sessions
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The auth provider
pub struct AuthService {
    db: Arc<Database>,
    providers: ProviderRegistry,
    cookies: CookieSettings,
    cookie_cache: CookieCache,
    session: SessionConfig,
    secret: String,
    base_url: String,
    trusted_origins: Vec<String>,
}

impl AuthService {
    pub fn new(config: &AppConfig, db: Arc<Database>, providers: ProviderRegistry) -> Self {
        let base_url = config.server.base_url();
        let mut trusted_origins: Vec<String> = config
            .auth
            .trusted_origins
            .iter()
            .filter_map(|origin| origin_of(origin))
            .collect();
        if let Some(own) = origin_of(&base_url) {
            trusted_origins.push(own);
        }

        Self {
            db,
            providers,
            cookies: CookieSettings::from_config(config),
            cookie_cache: CookieCache::new(&config.auth.session.cookie_cache, &config.auth.secret),
            session: config.auth.session.clone(),
            secret: config.auth.secret.clone(),
            base_url,
            trusted_origins,
        }
    }

    pub fn cookie_settings(&self) -> &CookieSettings {
        &self.cookies
    }

    // =========================================================================
    // Session reads
    // =========================================================================

    /// Resolve the current session from the request cookies
    ///
    /// Uses the cache cookie when it is fresh and matches the session token.
    /// Otherwise reads the database, extends the expiry once `update_age` has
    /// passed, and re-issues the cache cookie. Invalid or expired sessions
    /// clear the auth cookies.
    pub async fn get_session(
        &self,
        jar: CookieJar,
        disable_cookie_cache: bool,
    ) -> Result<(CookieJar, Option<SessionPayload>), AppError> {
        let Some(signed_token) = jar
            .get(self.cookies.session_token_name())
            .map(|cookie| cookie.value().to_owned())
        else {
            return Ok((jar, None));
        };

        let Ok(token) = verify_signed_value(&signed_token, &self.secret) else {
            tracing::debug!("Session cookie has an invalid signature");
            return Ok((self.cookies.clear(jar), None));
        };

        if self.cookie_cache.is_enabled() && !disable_cookie_cache {
            if let Some(payload) = self.cached_session(&jar, &token) {
                SESSION_LOOKUPS_TOTAL.with_label_values(&["cookie_cache"]).inc();
                return Ok((jar, Some(payload)));
            }
        }

        SESSION_LOOKUPS_TOTAL.with_label_values(&["database"]).inc();
        let Some(mut payload) = self.load_session(&token).await? else {
            return Ok((self.cookies.clear(jar), None));
        };

        let mut jar = jar;
        let now = Utc::now();
        if now - payload.session.updated_at >= Duration::seconds(self.session.update_age) {
            let expires_at = now + Duration::seconds(self.session.expires_in);
            self.db
                .extend_session(&payload.session.id, expires_at, now)
                .await?;
            payload.session.expires_at = expires_at;
            payload.session.updated_at = now;
            jar = jar.add(self.cookies.session_token_cookie(signed_token));
            tracing::debug!(session_id = %payload.session.id, "Session expiry extended");
        }

        let jar = self.set_cache_cookie(jar, &payload)?;
        Ok((jar, Some(payload)))
    }

    /// Resolve a signed session token without touching cookies
    ///
    /// Used for `Authorization: Bearer` requests.
    pub async fn session_from_signed_token(
        &self,
        signed_token: &str,
    ) -> Result<Option<SessionPayload>, AppError> {
        let Ok(token) = verify_signed_value(signed_token, &self.secret) else {
            return Ok(None);
        };
        self.load_session(&token).await
    }

    fn cached_session(&self, jar: &CookieJar, token: &str) -> Option<SessionPayload> {
        let cached = jar.get(self.cookies.session_data_name())?;
        match self.cookie_cache.decode(cached.value()) {
            Ok(payload) if payload.session.token == token => Some(payload),
            Ok(_) => {
                tracing::debug!("Session cache cookie belongs to another session");
                None
            }
            Err(error) => {
                tracing::debug!(%error, "Session cache cookie rejected");
                None
            }
        }
    }

    async fn load_session(&self, token: &str) -> Result<Option<SessionPayload>, AppError> {
        let Some(session) = self.db.get_session_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.db.delete_session_by_token(token).await?;
            tracing::debug!(session_id = %session.id, "Expired session removed on read");
            return Ok(None);
        }

        let Some(user) = self.db.get_user(&session.user_id).await? else {
            self.db.delete_session_by_token(token).await?;
            tracing::warn!(session_id = %session.id, "Session without user removed");
            return Ok(None);
        };

        Ok(Some(SessionPayload { session, user }))
    }

    fn set_cache_cookie(
        &self,
        jar: CookieJar,
        payload: &SessionPayload,
    ) -> Result<CookieJar, AppError> {
        if !self.cookie_cache.is_enabled() {
            return Ok(jar);
        }
        let encoded = self.cookie_cache.encode(payload)?;
        Ok(jar.add(self.cookies.session_data_cookie(encoded)))
    }

    // =========================================================================
    // Social sign-in
    // =========================================================================

    /// Start a social sign-in
    ///
    /// Stores the OAuth state and PKCE verifier, then returns the provider's
    /// authorization URL.
    ///
    /// # Errors
    /// `ProviderNotFound` for unknown providers, `Validation` for callback
    /// URLs outside the trusted origins.
    pub async fn sign_in_social(
        &self,
        request: SignInSocialRequest,
    ) -> Result<SignInRedirect, AppError> {
        let provider = self.providers.get(&request.provider)?;

        let callback_url = request.callback_url.unwrap_or_else(|| "/".to_string());
        self.check_redirect_target(&callback_url, "callbackURL")?;
        if let Some(error_callback_url) = &request.error_callback_url {
            self.check_redirect_target(error_callback_url, "errorCallbackURL")?;
        }

        let authorization = provider.authorization_request(&self.redirect_uri(provider.id()))?;

        let state_data = OAuthStateData {
            provider: provider.id().to_string(),
            code_verifier: authorization.code_verifier,
            callback_url,
            error_callback_url: request.error_callback_url,
        };
        let now = Utc::now();
        self.db
            .insert_verification(&Verification {
                id: EntityId::new().0,
                identifier: authorization.state,
                value: serde_json::to_string(&state_data)
                    .map_err(|e| AppError::Internal(e.into()))?,
                expires_at: now + Duration::minutes(STATE_TTL_MINUTES),
                created_at: now,
            })
            .await?;

        SIGN_INS_TOTAL
            .with_label_values(&[provider.id(), "started"])
            .inc();
        tracing::info!(provider = provider.id(), "Social sign-in started");

        Ok(SignInRedirect {
            url: authorization.url,
            redirect: true,
        })
    }

    /// Complete a social sign-in
    ///
    /// # Returns
    /// The updated cookie jar and the URL to redirect to. Failures after the
    /// state is known redirect to the error callback with `?error=<code>`.
    ///
    /// # Errors
    /// `InvalidState` when the state is missing, unknown, expired or was
    /// issued for a different provider.
    pub async fn handle_callback(
        &self,
        provider_id: &str,
        query: CallbackQuery,
        meta: RequestMeta,
        jar: CookieJar,
    ) -> Result<(CookieJar, String), AppError> {
        let provider = self.providers.get(provider_id)?;
        let state = query.state.ok_or(AppError::InvalidState)?;
        let verification = self
            .db
            .take_verification(&state)
            .await?
            .ok_or(AppError::InvalidState)?;
        if verification.is_expired() {
            return Err(AppError::InvalidState);
        }
        let state_data: OAuthStateData =
            serde_json::from_str(&verification.value).map_err(|_| AppError::InvalidState)?;
        if state_data.provider != provider.id() {
            return Err(AppError::InvalidState);
        }

        let error_target = state_data
            .error_callback_url
            .clone()
            .unwrap_or_else(|| format!("{AUTH_BASE_PATH}/error"));

        if let Some(error) = query.error {
            SIGN_INS_TOTAL
                .with_label_values(&[provider.id(), "denied"])
                .inc();
            tracing::info!(provider = provider.id(), %error, "Provider returned an error");
            return Ok((jar, append_query(&error_target, "error", &error)));
        }

        let Some(code) = query.code else {
            return Ok((jar, append_query(&error_target, "error", "no_code")));
        };

        let redirect_uri = self.redirect_uri(provider.id());
        let outcome = async {
            let tokens = provider
                .exchange_code(&code, &state_data.code_verifier, &redirect_uri)
                .await?;
            let profile = provider.user_profile(&tokens).await?;
            let user = self.resolve_user(provider.id(), &profile, &tokens).await?;
            self.create_session(&user, &meta).await
        }
        .await;

        match outcome {
            Ok(payload) => {
                SIGN_INS_TOTAL
                    .with_label_values(&[provider.id(), "success"])
                    .inc();
                tracing::info!(
                    provider = provider.id(),
                    user_id = %payload.user.id,
                    "Social sign-in completed"
                );
                let signed = sign_value(&payload.session.token, &self.secret)?;
                let jar = jar.add(self.cookies.session_token_cookie(signed));
                let jar = self.set_cache_cookie(jar, &payload)?;
                Ok((jar, state_data.callback_url))
            }
            Err(error) => {
                SIGN_INS_TOTAL
                    .with_label_values(&[provider.id(), "failure"])
                    .inc();
                tracing::warn!(provider = provider.id(), %error, "Social sign-in failed");
                let code = error.code().to_ascii_lowercase();
                Ok((jar, append_query(&error_target, "error", &code)))
            }
        }
    }

    /// Find or create the user for a provider identity
    ///
    /// An existing user with the same email is only linked when the provider
    /// reports the email as verified.
    async fn resolve_user(
        &self,
        provider_id: &str,
        profile: &SocialProfile,
        tokens: &ProviderTokens,
    ) -> Result<User, AppError> {
        let now = Utc::now();

        let user = if let Some(mut user) = self
            .db
            .get_user_by_account(provider_id, &profile.account_id)
            .await?
        {
            user.name = profile.name.clone();
            user.image = profile.image.clone();
            user.email_verified = user.email_verified || profile.email_verified;
            user.updated_at = now;
            self.db.update_user_profile(&user).await?;
            user
        } else if let Some(user) = self.db.get_user_by_email(&profile.email).await? {
            if !profile.email_verified {
                return Err(AppError::AccountNotLinked);
            }
            tracing::info!(user_id = %user.id, provider = provider_id, "Linking provider account");
            user
        } else {
            let user = User {
                id: EntityId::new().0,
                name: profile.name.clone(),
                email: profile.email.clone(),
                email_verified: profile.email_verified,
                image: profile.image.clone(),
                created_at: now,
                updated_at: now,
            };
            self.db.insert_user(&user).await?;
            tracing::info!(user_id = %user.id, provider = provider_id, "User created");
            user
        };

        self.db
            .upsert_account(&Account {
                id: EntityId::new().0,
                account_id: profile.account_id.clone(),
                provider_id: provider_id.to_string(),
                user_id: user.id.clone(),
                access_token: Some(tokens.access_token.clone()),
                scope: tokens.scope.clone(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        Ok(user)
    }

    async fn create_session(
        &self,
        user: &User,
        meta: &RequestMeta,
    ) -> Result<SessionPayload, AppError> {
        let now = Utc::now();
        let session = Session {
            id: EntityId::new().0,
            token: generate_session_token(),
            user_id: user.id.clone(),
            expires_at: now + Duration::seconds(self.session.expires_in),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_session(&session).await?;

        Ok(SessionPayload {
            session,
            user: user.clone(),
        })
    }

    // =========================================================================
    // Sign-out
    // =========================================================================

    /// Delete the current session and expire the auth cookies
    pub async fn sign_out(&self, jar: CookieJar) -> Result<CookieJar, AppError> {
        let token = jar
            .get(self.cookies.session_token_name())
            .and_then(|cookie| verify_signed_value(cookie.value(), &self.secret).ok());

        if let Some(token) = token {
            if self.db.delete_session_by_token(&token).await? {
                SIGN_OUTS_TOTAL.inc();
                tracing::info!("Session signed out");
            }
        }

        Ok(self.cookies.clear(jar))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove expired sessions and OAuth state
    ///
    /// # Returns
    /// `(sessions_removed, states_removed)`
    pub async fn purge_expired(&self) -> Result<(u64, u64), AppError> {
        let now = Utc::now();
        let sessions = self.db.delete_expired_sessions(now).await?;
        let states = self.db.delete_expired_verifications(now).await?;
        Ok((sessions, states))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn redirect_uri(&self, provider_id: &str) -> String {
        format!("{}{AUTH_BASE_PATH}/callback/{provider_id}", self.base_url)
    }

    /// Accept same-site paths and absolute URLs on trusted origins
    fn check_redirect_target(&self, target: &str, field: &str) -> Result<(), AppError> {
        if is_trusted_redirect(target, &self.base_url, &self.trusted_origins) {
            Ok(())
        } else {
            Err(AppError::Validation(format!("{field} is not a trusted origin")))
        }
    }
}

/// Whether `target` lands on one of `trusted_origins`
///
/// Paths are resolved against `base_url`. Targets containing whitespace,
/// control characters or backslashes are rejected outright.
fn is_trusted_redirect(target: &str, base_url: &str, trusted_origins: &[String]) -> bool {
    if target.is_empty()
        || target.starts_with("//")
        || target.contains('\\')
        || target.chars().any(|c| c.is_control() || c.is_whitespace())
    {
        return false;
    }

    let resolved = if target.starts_with('/') {
        url::Url::parse(base_url).and_then(|base| base.join(target))
    } else {
        url::Url::parse(target)
    };

    match resolved.map(|url| url.origin()) {
        Ok(origin @ url::Origin::Tuple(..)) => {
            trusted_origins.contains(&origin.ascii_serialization())
        }
        _ => false,
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    match parsed.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

/// Append `key=value` to a URL or path, keeping any existing query
pub fn append_query(target: &str, key: &str, value: &str) -> String {
    let encoded: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}{encoded}")
}
