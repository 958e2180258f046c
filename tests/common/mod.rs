//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use authdemo::{AppState, config};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Access token issued by the mock GitHub token endpoint
pub const MOCK_ACCESS_TOKEN: &str = "gho_test";

/// Identity served by the mock GitHub user API
pub const MOCK_GITHUB_ID: u64 = 583231;
pub const MOCK_GITHUB_LOGIN: &str = "octocat";
pub const MOCK_GITHUB_NAME: &str = "The Octocat";
pub const MOCK_GITHUB_EMAIL: &str = "octocat@example.com";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub github_addr: String,
    /// Whether the mock GitHub reports the primary email as verified
    pub github_email_verified: Arc<AtomicBool>,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    ///
    /// GitHub endpoints point at a local mock, so the full OAuth flow runs
    /// without network access.
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let github_email_verified = Arc::new(AtomicBool::new(true));
        let github_addr = spawn_mock_github(github_email_verified.clone()).await;

        // Bind first so the public domain matches the callback URL
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                secret: "test-secret-key-32-bytes-long!!!".to_string(),
                cookie_prefix: "authdemo".to_string(),
                trusted_origins: Vec::new(),
                cleanup_interval_seconds: 3600,
                session: config::SessionConfig {
                    expires_in: 604_800,
                    update_age: 86_400,
                    cookie_cache: config::CookieCacheConfig {
                        enabled: true,
                        max_age: 300,
                        strategy: config::CookieCacheStrategy::Jwt,
                    },
                },
                github: config::GitHubOAuthConfig {
                    client_id: "test-client-id".to_string(),
                    client_secret: "test-client-secret".to_string(),
                    authorize_url: format!("{github_addr}/login/oauth/authorize"),
                    token_url: format!("{github_addr}/login/oauth/access_token"),
                    api_base_url: github_addr.clone(),
                    scopes: vec!["read:user".to_string(), "user:email".to_string()],
                },
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        authdemo::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Build router
        let app = authdemo::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{addr}"),
            github_addr,
            github_email_verified,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Name of the session token cookie
    pub fn session_cookie_name(&self) -> String {
        self.state
            .auth
            .cookie_settings()
            .session_token_name()
            .to_string()
    }

    /// Make the mock GitHub report its primary email as (un)verified
    pub fn set_github_email_verified(&self, verified: bool) {
        self.github_email_verified.store(verified, Ordering::SeqCst);
    }

    /// Insert a user with the given email
    pub async fn create_test_user(&self, email: &str) -> authdemo::data::User {
        use authdemo::data::{EntityId, User};

        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            name: "Test User".to_string(),
            email: email.to_string(),
            email_verified: true,
            image: Some("https://example.com/avatar.png".to_string()),
            created_at: now,
            updated_at: now,
        };
        self.state.db.insert_user(&user).await.unwrap();
        user
    }

    /// Create a user with a live session
    ///
    /// # Returns
    /// The signed session token, usable as cookie value or bearer token
    pub async fn create_test_session(&self) -> String {
        let now = Utc::now();
        let (signed, _) = self
            .create_test_session_with(now + chrono::Duration::days(7), now)
            .await;
        signed
    }

    /// Create a user with a session carrying the given timestamps
    ///
    /// # Returns
    /// `(signed_token, raw_token)`
    pub async fn create_test_session_with(
        &self,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> (String, String) {
        use authdemo::auth::sign_value;
        use authdemo::data::{EntityId, Session};

        let email = format!("test-{}@example.com", EntityId::new().0.to_lowercase());
        let user = self.create_test_user(&email).await;

        let token = EntityId::new().0;
        let session = Session {
            id: EntityId::new().0,
            token: token.clone(),
            user_id: user.id.clone(),
            expires_at,
            ip_address: None,
            user_agent: None,
            created_at: updated_at,
            updated_at,
        };
        self.state.db.insert_session(&session).await.unwrap();

        let signed = sign_value(&token, &self.state.config.auth.secret)
            .expect("session token can be signed");
        (signed, token)
    }

    /// Run the GitHub sign-in through the mock provider
    ///
    /// # Returns
    /// The `Location` the callback redirected to
    pub async fn complete_sign_in(
        &self,
        client: &reqwest::Client,
        body: serde_json::Value,
    ) -> String {
        let response = client
            .post(self.url("/api/auth/sign-in/social"))
            .json(&body)
            .send()
            .await
            .expect("sign-in request succeeds");
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("json body");
        let state = query_param(body["url"].as_str().expect("url"), "state").expect("state");

        let response = client
            .get(self.url("/api/auth/callback/github"))
            .query(&[("state", state.as_str()), ("code", "mock-code")])
            .send()
            .await
            .expect("callback request succeeds");
        assert!(response.status().is_redirection());
        location(&response)
    }
}

/// Client that keeps cookies and does not follow redirects
pub fn browser_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build browser client")
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Value of a query parameter in an absolute URL
pub fn query_param(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// Start a stand-in for GitHub's token endpoint and user API
async fn spawn_mock_github(email_verified: Arc<AtomicBool>) -> String {
    let app = Router::new()
        .route(
            "/login/oauth/access_token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": MOCK_ACCESS_TOKEN,
                    "token_type": "bearer",
                    "scope": "read:user user:email",
                }))
            }),
        )
        .route(
            "/user",
            get(|| async {
                Json(serde_json::json!({
                    "id": MOCK_GITHUB_ID,
                    "login": MOCK_GITHUB_LOGIN,
                    "name": MOCK_GITHUB_NAME,
                    "email": null,
                    "avatar_url": "https://avatars.example.com/u/583231",
                }))
            }),
        )
        .route("/user/emails", get(mock_emails))
        .with_state(email_verified);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn mock_emails(State(verified): State<Arc<AtomicBool>>) -> Json<serde_json::Value> {
    Json(serde_json::json!([
        { "email": "octocat@users.noreply.example.com", "primary": false, "verified": true },
        { "email": MOCK_GITHUB_EMAIL, "primary": true, "verified": verified.load(Ordering::SeqCst) },
    ]))
}
