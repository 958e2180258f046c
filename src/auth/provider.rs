//! Social identity providers
//!
//! The authorization code exchange and PKCE are handled by the `oauth2`
//! crate. This module only builds the client and maps the provider's
//! user API onto [`SocialProfile`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;

use crate::config::{AuthConfig, GitHubOAuthConfig};
use crate::error::AppError;

/// Authorization redirect plus the secrets to keep until the callback
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    /// Granted scopes, comma separated
    pub scope: Option<String>,
}

/// User identity as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct SocialProfile {
    /// Stable user id at the provider
    pub account_id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
}

/// A social login provider
#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Provider id used in routes, e.g. "github"
    fn id(&self) -> &'static str;

    /// Build the authorization URL the browser is sent to
    fn authorization_request(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError>;

    /// Exchange an authorization code for tokens
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderTokens, AppError>;

    /// Fetch the signed-in user's profile
    async fn user_profile(&self, tokens: &ProviderTokens) -> Result<SocialProfile, AppError>;
}

// =============================================================================
// GitHub
// =============================================================================

/// GitHub OAuth app
pub struct GitHubProvider {
    config: GitHubOAuthConfig,
    http: reqwest::Client,
}

/// GitHub user info
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

/// Entry of `GET /user/emails`
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubProvider {
    pub fn new(config: GitHubOAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn client(&self, redirect_uri: &str) -> Result<BasicClient, AppError> {
        let auth_url = AuthUrl::new(self.config.authorize_url.clone())
            .map_err(|e| AppError::Config(format!("invalid GitHub authorize_url: {e}")))?;
        let token_url = TokenUrl::new(self.config.token_url.clone())
            .map_err(|e| AppError::Config(format!("invalid GitHub token_url: {e}")))?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AppError::Config(format!("invalid redirect URI: {e}")))?;

        Ok(BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            Some(ClientSecret::new(self.config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(self.api_url(path))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "GitHub API {path} returned {status}"
            )));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SocialProvider for GitHubProvider {
    fn id(&self) -> &'static str {
        "github"
    }

    fn authorization_request(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError> {
        let client = self.client(redirect_uri)?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: csrf_state.secret().clone(),
            code_verifier: pkce_verifier.secret().clone(),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderTokens, AppError> {
        let token = self
            .client(redirect_uri)?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::Provider(format!("GitHub token exchange failed: {e}")))?;

        let scope = token.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|scope| scope.as_str())
                .collect::<Vec<_>>()
                .join(",")
        });

        Ok(ProviderTokens {
            access_token: token.access_token().secret().clone(),
            scope,
        })
    }

    async fn user_profile(&self, tokens: &ProviderTokens) -> Result<SocialProfile, AppError> {
        let user: GitHubUser = self.get_json("/user", &tokens.access_token).await?;

        // The emails endpoint needs the user:email scope; without it we can
        // still sign in when the profile email is public.
        let emails: Vec<GitHubEmail> = match self.get_json("/user/emails", &tokens.access_token).await
        {
            Ok(emails) => emails,
            Err(error) => {
                tracing::debug!(%error, "GitHub email list unavailable");
                Vec::new()
            }
        };

        github_profile(user, &emails)
    }
}

fn github_profile(user: GitHubUser, emails: &[GitHubEmail]) -> Result<SocialProfile, AppError> {
    let email = user
        .email
        .filter(|email| !email.is_empty())
        .or_else(|| {
            emails
                .iter()
                .find(|entry| entry.primary)
                .or_else(|| emails.first())
                .map(|entry| entry.email.clone())
        })
        .ok_or_else(|| AppError::Provider("GitHub account has no email address".to_string()))?;

    let email_verified = emails
        .iter()
        .any(|entry| entry.verified && entry.email.eq_ignore_ascii_case(&email));

    Ok(SocialProfile {
        account_id: user.id.to_string(),
        name: user
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(user.login),
        email,
        email_verified,
        image: user.avatar_url,
    })
}

// =============================================================================
// Registry
// =============================================================================

/// Providers available for sign-in, by id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn SocialProvider>>,
}

impl ProviderRegistry {
    /// Registry with every provider the configuration declares
    pub fn from_config(config: &AuthConfig, http: reqwest::Client) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(GitHubProvider::new(config.github.clone(), http)));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn SocialProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    /// Look up a provider
    ///
    /// # Errors
    /// `ProviderNotFound` for unknown ids
    pub fn get(&self, id: &str) -> Result<Arc<dyn SocialProvider>, AppError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::ProviderNotFound(id.to_string()))
    }
}
