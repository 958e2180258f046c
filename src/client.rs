//! Client SDK for the `/api/auth` endpoints
//!
//! [`AuthClient`] keeps cookies between calls the way a browser would, so a
//! session established by the OAuth callback is visible to later
//! `get_session` calls.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::{AUTH_BASE_PATH, SessionPayload, SignInRedirect};

/// Errors returned by auth API calls
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server answered with an error body
    #[error("auth API error {status}: {}", message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    /// Request never produced a usable response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Operations the sign-in view needs from the auth provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn get_session(&self) -> Result<Option<SessionPayload>, ClientError>;

    async fn sign_in_social(
        &self,
        provider: &str,
        callback_url: &str,
    ) -> Result<SignInRedirect, ClientError>;

    async fn sign_out(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// HTTP implementation of [`AuthApi`]
#[derive(Debug, Clone)]
pub struct AuthClient {
    base_url: String,
    http: reqwest::Client,
}

impl AuthClient {
    /// Create a client for the server at `base_url` (e.g. "http://localhost:3000")
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent("authdemo-client/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self::with_http_client(base_url, http))
    }

    /// Use a preconfigured `reqwest::Client`
    ///
    /// The client should have a cookie store enabled.
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{AUTH_BASE_PATH}{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ErrorBody>().await.ok();
        Err(ClientError::Api {
            status: status.as_u16(),
            code: body.as_ref().and_then(|b| b.code.clone()),
            message: body.and_then(|b| b.message),
        })
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn get_session(&self) -> Result<Option<SessionPayload>, ClientError> {
        let response = self.http.get(self.url("/get-session")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn sign_in_social(
        &self,
        provider: &str,
        callback_url: &str,
    ) -> Result<SignInRedirect, ClientError> {
        let response = self
            .http
            .post(self.url("/sign-in/social"))
            .json(&serde_json::json!({
                "provider": provider,
                "callbackURL": callback_url,
            }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.url("/sign-out")).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_under_the_auth_base_path() {
        let client = AuthClient::with_http_client("http://localhost:3000/", reqwest::Client::new());
        assert_eq!(
            client.url("/get-session"),
            "http://localhost:3000/api/auth/get-session"
        );
    }

    #[test]
    fn api_error_display_includes_message() {
        let error = ClientError::Api {
            status: 404,
            code: Some("PROVIDER_NOT_FOUND".to_string()),
            message: Some("Provider not found: gitlab".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "auth API error 404: Provider not found: gitlab"
        );
    }
}
